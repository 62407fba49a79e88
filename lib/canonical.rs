//! Matrix product states in mixed canonical form.
//!
//! A [`CanonicalMPS`] has a designated orthogonality center `c`: every tensor
//! left of `c` is left-orthogonal,
//! ```text
//! Σ_{a, i} conj(A[a, i, b]) A[a, i, b'] = δ(b, b')
//! ```
//! and every tensor right of `c` is right-orthogonal (the same condition over
//! the physical index and right bond). All of the state's norm then lives in the
//! center tensor, which makes local observables and local truncations exact.
//!
//! The form is reached with a sequence of orthogonalization sweeps. Without
//! truncation these use QR (left to right) and LQ (right to left)
//! decompositions. When the strategy asks for truncation, the state is first
//! made fully left-orthogonal, then swept from right to left with truncated
//! SVDs so that every bond is cut against orthonormal environments, and finally
//! swept back to the center.

use log::debug;
use ndarray as nd;
use crate::{
    ComplexScalar,
    chain::{ MatrixProduct, TensorChain },
    environment::apply_local,
    linalg::{
        fuse_left,
        fuse_right,
        lq,
        norm_sq,
        qr,
        split_left,
        split_right,
        svd,
        vdot,
    },
    mps::{ MPS, MPSError, MPSResult },
    strategy::Strategy,
    truncate::{ SchmidtDecomp, combine_errors },
};

// make site `k` left-orthogonal with a QR decomposition; the R factor is
// absorbed into site `k + 1`
pub(crate) fn qr_right_step<A>(data: &mut [nd::Array3<A>], k: usize)
where A: ComplexScalar
{
    let (l, d, _) = data[k].dim();
    let (q, r) = qr(&fuse_left(&data[k]));
    data[k] = split_left(&q, l, d);
    let (_, dn, rn) = data[k + 1].dim();
    data[k + 1] = split_right(&r.dot(&fuse_right(&data[k + 1])), dn, rn);
}

// make site `k` right-orthogonal with an LQ decomposition; the L factor is
// absorbed into site `k - 1`
pub(crate) fn lq_left_step<A>(data: &mut [nd::Array3<A>], k: usize)
where A: ComplexScalar
{
    let (_, d, r) = data[k].dim();
    let (lf, q) = lq(&fuse_right(&data[k]));
    data[k] = split_right(&q, d, r);
    let (lp, dp, _) = data[k - 1].dim();
    data[k - 1] = split_left(&fuse_left(&data[k - 1]).dot(&lf), lp, dp);
}

// truncated version of `qr_right_step`; returns the discarded weight
pub(crate) fn svd_right_step<A>(
    data: &mut [nd::Array3<A>],
    k: usize,
    strategy: &Strategy,
) -> f64
where A: ComplexScalar
{
    let (l, d, _) = data[k].dim();
    let schmidt = fuse_left(&data[k]).local_decomp(strategy);
    data[k] = split_left(&schmidt.u, l, d);
    let (_, dn, rn) = data[k + 1].dim();
    data[k + 1]
        = split_right(&schmidt.svt().dot(&fuse_right(&data[k + 1])), dn, rn);
    schmidt.discarded
}

// truncated version of `lq_left_step`; returns the discarded weight
pub(crate) fn svd_left_step<A>(
    data: &mut [nd::Array3<A>],
    k: usize,
    strategy: &Strategy,
) -> f64
where A: ComplexScalar
{
    let (_, d, r) = data[k].dim();
    let schmidt = fuse_right(&data[k]).local_decomp(strategy);
    data[k] = split_right(&schmidt.vt, d, r);
    let (lp, dp, _) = data[k - 1].dim();
    data[k - 1] = split_left(&fuse_left(&data[k - 1]).dot(&schmidt.us()), lp, dp);
    schmidt.discarded
}

// bring `data` into canonical form about `center`, returning the total
// discarded weight
pub(crate) fn canonicalize<A>(
    data: &mut [nd::Array3<A>],
    center: usize,
    strategy: &Strategy,
) -> f64
where A: ComplexScalar
{
    let n = data.len();
    if !strategy.truncates() {
        (0..center).for_each(|k| qr_right_step(data, k));
        (center + 1..n).rev().for_each(|k| lq_left_step(data, k));
        return 0.0;
    }
    (0..n - 1).for_each(|k| qr_right_step(data, k));
    let discarded: f64
        = (1..n).rev()
        .map(|k| svd_left_step(data, k, strategy))
        .sum();
    (0..center).for_each(|k| qr_right_step(data, k));
    discarded
}

// fuse a two-site tensor :: { u, s1, s2, v } into a matrix :: { u<>s1, s2<>v }
fn two_site_matrix<A>(t: &nd::Array4<A>) -> nd::Array2<A>
where A: ComplexScalar
{
    let (l, d1, d2, r) = t.dim();
    nd::Array2::from_shape_fn((l * d1, d2 * r), |(us, sv)| {
        t[[us / d1, us % d1, sv / r, sv % r]]
    })
}

/// A matrix product state in mixed canonical form about a single center site.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalMPS<A> {
    pub(crate) chain: TensorChain<A>,
    pub(crate) center: usize,
    pub(crate) error: f64,
    pub(crate) strategy: Strategy,
}

impl<A> MatrixProduct<A> for CanonicalMPS<A>
where A: ComplexScalar
{
    fn chain(&self) -> &TensorChain<A> { &self.chain }

    fn error(&self) -> f64 { self.error }

    /// Computed from the center tensor alone.
    fn norm_squared(&self) -> f64 { norm_sq(&self.chain.data[self.center]) }
}

impl<A> CanonicalMPS<A>
where A: ComplexScalar
{
    /// Bring a state into canonical form about `center` (default: site 0).
    ///
    /// `strategy` defaults to the state's own strategy. If it truncates, the
    /// discarded weight is merged into the error; if it normalizes, the center
    /// tensor is rescaled to unit norm afterwards.
    ///
    /// Fails if `center` is past the end of the chain, or if normalization is
    /// requested for a zero state.
    pub fn new(
        state: MPS<A>,
        center: Option<usize>,
        strategy: Option<Strategy>,
    ) -> MPSResult<Self>
    {
        let n = state.size();
        let center = center.unwrap_or(0);
        if center >= n { return Err(MPSError::CenterOutOfRange); }
        let strategy = strategy.unwrap_or(state.strategy);
        let mut data = state.chain.into_inner();
        let discarded = canonicalize(&mut data, center, &strategy);
        debug!(
            "canonical form at site {center} of {n}: discarded weight {discarded:e}"
        );
        let mut canonical = Self {
            chain: TensorChain::from_vec_unchecked(data),
            center,
            error: combine_errors(state.error, discarded),
            strategy,
        };
        if strategy.normalize { canonical.normalize_inplace()?; }
        Ok(canonical)
    }

    /// Return the position of the orthogonality center.
    pub fn center(&self) -> usize { self.center }

    /// Return the tensor at the orthogonality center.
    pub fn center_tensor(&self) -> &nd::Array3<A> { &self.chain.data[self.center] }

    /// Return the strategy attached to this state.
    pub fn strategy(&self) -> Strategy { self.strategy }

    /// Merge a newly incurred approximation error into the running bound and
    /// return the new bound.
    pub fn update_error(&mut self, delta: f64) -> f64 {
        self.error = combine_errors(self.error, delta);
        self.error
    }

    /// Move the orthogonality center to `new_center` without truncation.
    ///
    /// Each step is a single QR or LQ decomposition.
    pub fn recenter(mut self, new_center: usize) -> MPSResult<Self> {
        if new_center >= self.size() { return Err(MPSError::CenterOutOfRange); }
        let data = &mut self.chain.data;
        while self.center < new_center {
            qr_right_step(data, self.center);
            self.center += 1;
        }
        while self.center > new_center {
            lq_left_step(data, self.center);
            self.center -= 1;
        }
        Ok(self)
    }

    /// Move the orthogonality center to `new_center`, truncating every bond
    /// crossed along the way according to `strategy`.
    ///
    /// The discarded weight is merged into the error.
    pub fn recenter_truncated(mut self, new_center: usize, strategy: &Strategy)
        -> MPSResult<Self>
    {
        if new_center >= self.size() { return Err(MPSError::CenterOutOfRange); }
        let mut discarded: f64 = 0.0;
        let data = &mut self.chain.data;
        while self.center < new_center {
            discarded += svd_right_step(data, self.center, strategy);
            self.center += 1;
        }
        while self.center > new_center {
            discarded += svd_left_step(data, self.center, strategy);
            self.center -= 1;
        }
        self.update_error(discarded);
        Ok(self)
    }

    fn check_two_site(&self, t: &nd::Array4<A>, site: usize) -> MPSResult<()> {
        if site + 1 >= self.size() { return Err(MPSError::SiteOutOfBounds); }
        if self.center != site && self.center != site + 1 {
            return Err(MPSError::CenterOutOfRange);
        }
        let (l, d1, _) = self.chain.data[site].dim();
        let (_, d2, r) = self.chain.data[site + 1].dim();
        if t.dim().0 != l || t.dim().3 != r {
            return Err(MPSError::StateIncompatibleShape {
                expected: l * d1 * d2 * r,
                got: t.len(),
            });
        }
        if t.dim().1 != d1 || t.dim().2 != d2 {
            return Err(MPSError::PhysicalDimensionMismatch);
        }
        Ok(())
    }

    /// Replace sites `site` and `site + 1` by a truncated split of the two-site
    /// tensor `t :: { u, s1, s2, v }`, leaving `site` left-orthogonal and the
    /// center at `site + 1`.
    ///
    /// The current center must be at `site` or `site + 1`. Returns the
    /// discarded weight, which is *not* merged into the error.
    pub fn update_2site_right(
        &mut self,
        t: &nd::Array4<A>,
        site: usize,
        strategy: &Strategy,
    ) -> MPSResult<f64>
    {
        self.check_two_site(t, site)?;
        let (l, d1, d2, r) = t.dim();
        let schmidt = two_site_matrix(t).local_decomp(strategy);
        self.chain.data[site] = split_left(&schmidt.u, l, d1);
        self.chain.data[site + 1] = split_right(&schmidt.svt(), d2, r);
        self.center = site + 1;
        Ok(schmidt.discarded)
    }

    /// Replace sites `site` and `site + 1` by a truncated split of the two-site
    /// tensor `t :: { u, s1, s2, v }`, leaving `site + 1` right-orthogonal and
    /// the center at `site`.
    ///
    /// The current center must be at `site` or `site + 1`. Returns the
    /// discarded weight, which is *not* merged into the error.
    pub fn update_2site_left(
        &mut self,
        t: &nd::Array4<A>,
        site: usize,
        strategy: &Strategy,
    ) -> MPSResult<f64>
    {
        self.check_two_site(t, site)?;
        let (l, d1, d2, r) = t.dim();
        let schmidt = two_site_matrix(t).local_decomp(strategy);
        self.chain.data[site] = split_left(&schmidt.us(), l, d1);
        self.chain.data[site + 1] = split_right(&schmidt.vt, d2, r);
        self.center = site;
        Ok(schmidt.discarded)
    }

    /// Return the squared Schmidt values across the bond to the right of the
    /// center, in descending order.
    ///
    /// For a normalized state these are the eigenvalues of the reduced density
    /// matrix of either half of the chain.
    pub fn schmidt_weights(&self) -> Vec<f64> {
        svd(&fuse_left(self.center_tensor())).s
            .into_iter()
            .map(|s| s * s)
            .collect()
    }

    /// Return the Von Neumann entropy (in nats) of the bipartition to the right
    /// of the center.
    pub fn entanglement_entropy(&self) -> f64 {
        let weights = self.schmidt_weights();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 { return 0.0; }
        weights.into_iter()
            .map(|w| w / total)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum()
    }

    /// Compute `⟨ψ|O|ψ⟩` for an operator acting on the center site, using
    /// only the center tensor.
    pub fn center_expectation1(&self, op: &nd::Array2<A>) -> MPSResult<A> {
        let a = self.center_tensor();
        let d = a.dim().1;
        if op.dim() != (d, d) { return Err(MPSError::OperatorIncompatibleShape); }
        Ok(vdot(a, &apply_local(op, a)))
    }

    /// Rescale the center tensor so that the state has unit norm.
    ///
    /// The error is divided by the old squared norm. Fails for a zero state.
    pub fn normalize_inplace(&mut self) -> MPSResult<()> {
        let norm2 = self.norm_squared();
        if norm2 == 0.0 { return Err(MPSError::ZeroNorm); }
        let norm = norm2.sqrt();
        self.chain.data[self.center].mapv_inplace(|a| a.unscale(norm));
        self.error /= norm2;
        Ok(())
    }

    /// Like [`Self::normalize_inplace`], but by value.
    pub fn normalized(mut self) -> MPSResult<Self> {
        self.normalize_inplace()?;
        Ok(self)
    }

    /// Forget the canonical structure.
    pub fn into_mps(self) -> MPS<A> {
        MPS::from_chain(self.chain, self.error, self.strategy)
    }
}

impl<A> From<CanonicalMPS<A>> for MPS<A>
where A: ComplexScalar
{
    fn from(state: CanonicalMPS<A>) -> Self { state.into_mps() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;
    use crate::{
        linalg::{ adjoint, distance, identity },
        strategy::{ DEFAULT_STRATEGY, NO_TRUNCATION },
    };

    fn sample_state(n: usize) -> MPS<C64> {
        let v: Vec<C64>
            = (0..1 << n)
            .map(|k| C64::new((k as f64 * 0.37).sin(), (k as f64 * 0.11).cos()))
            .collect();
        MPS::from_vector(v, &vec![2; n], NO_TRUNCATION, false).unwrap()
    }

    fn assert_left_orthogonal(a: &nd::Array3<C64>) {
        let m = fuse_left(a);
        let r = m.ncols();
        assert_abs_diff_eq!(
            distance(&adjoint(&m).dot(&m), &identity(r)), 0.0, epsilon = 1e-10);
    }

    fn assert_right_orthogonal(a: &nd::Array3<C64>) {
        let m = fuse_right(a);
        let l = m.nrows();
        assert_abs_diff_eq!(
            distance(&m.dot(&adjoint(&m)), &identity(l)), 0.0, epsilon = 1e-10);
    }

    fn assert_canonical(psi: &CanonicalMPS<C64>) {
        for k in 0..psi.center() {
            assert_left_orthogonal(&psi.chain()[k]);
        }
        for k in psi.center() + 1..psi.size() {
            assert_right_orthogonal(&psi.chain()[k]);
        }
    }

    #[test]
    fn canonical_form_preserves_state() {
        let psi = sample_state(5);
        let v = psi.to_vector();
        for center in 0..5 {
            let c = CanonicalMPS::new(psi.clone(), Some(center), Some(NO_TRUNCATION))
                .unwrap();
            assert_eq!(c.center(), center);
            assert_canonical(&c);
            assert_abs_diff_eq!(distance(&c.to_vector(), &v), 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(c.norm_squared(), psi.norm_squared(), epsilon = 1e-10);
        }
        assert!(matches!(
            CanonicalMPS::new(psi, Some(5), None),
            Err(MPSError::CenterOutOfRange)
        ));
    }

    #[test]
    fn truncating_canonical_form() {
        let psi = sample_state(6);
        let strategy = DEFAULT_STRATEGY.with_max_bond_dimension(2);
        let c = CanonicalMPS::new(psi.clone(), Some(2), Some(strategy)).unwrap();
        assert_canonical(&c);
        assert!(c.max_bond_dimension() <= 2);
        let dist = distance(&c.to_vector(), &psi.to_vector());
        assert!(c.error() > 0.0);
        assert!(dist * dist <= c.error() * (1.0 + 1e-8) + 1e-12);
    }

    #[test]
    fn recentering() {
        let psi = sample_state(5);
        let v = psi.to_vector();
        let c = CanonicalMPS::new(psi, None, Some(NO_TRUNCATION)).unwrap();
        let c = c.recenter(4).unwrap();
        assert_eq!(c.center(), 4);
        assert_canonical(&c);
        let c = c.recenter(1).unwrap();
        assert_canonical(&c);
        assert_abs_diff_eq!(distance(&c.to_vector(), &v), 0.0, epsilon = 1e-10);
        assert!(matches!(c.clone().recenter(5), Err(MPSError::CenterOutOfRange)));

        let t = c.recenter_truncated(3, &NO_TRUNCATION.with_max_bond_dimension(1))
            .unwrap();
        assert_eq!(t.center(), 3);
        assert!(t.error() > 0.0);
    }

    #[test]
    fn two_site_updates() {
        let psi = sample_state(4);
        let c = CanonicalMPS::new(psi, Some(1), Some(NO_TRUNCATION)).unwrap();
        let v = c.to_vector();
        // rebuild the two-site tensor at sites 1, 2 and split it back
        let a = &c.chain()[1];
        let b = &c.chain()[2];
        let (l, d1, m) = a.dim();
        let (_, d2, r) = b.dim();
        let t = nd::Array4::from_shape_fn((l, d1, d2, r), |(u, s1, s2, v)| {
            (0..m).fold(C64::new(0.0, 0.0), |acc, x| acc + a[[u, s1, x]] * b[[x, s2, v]])
        });
        let mut right = c.clone();
        let disc = right.update_2site_right(&t, 1, &NO_TRUNCATION).unwrap();
        assert_eq!(right.center(), 2);
        assert_abs_diff_eq!(disc, 0.0);
        assert_canonical(&right);
        assert_abs_diff_eq!(distance(&right.to_vector(), &v), 0.0, epsilon = 1e-10);

        let mut left = right.clone();
        left.update_2site_left(&t, 1, &NO_TRUNCATION).unwrap();
        assert_eq!(left.center(), 1);
        assert_canonical(&left);
        assert_abs_diff_eq!(distance(&left.to_vector(), &v), 0.0, epsilon = 1e-10);

        assert!(matches!(
            left.update_2site_right(&t, 3, &NO_TRUNCATION),
            Err(MPSError::SiteOutOfBounds)
        ));
        assert!(matches!(
            left.update_2site_right(&t, 0, &NO_TRUNCATION),
            Err(MPSError::StateIncompatibleShape { .. })
        ));
    }

    #[test]
    fn entanglement_of_bell_pair() {
        let s = 0.5_f64.sqrt();
        let v = [C64::new(s, 0.0), C64::new(0.0, 0.0), C64::new(0.0, 0.0), C64::new(s, 0.0)];
        let psi = MPS::from_vector(v, &[2, 2], NO_TRUNCATION, false).unwrap();
        let c = CanonicalMPS::new(psi, Some(0), None).unwrap();
        let w = c.schmidt_weights();
        assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c.entanglement_entropy(), 2.0_f64.ln(), epsilon = 1e-12);

        let z: nd::Array2<C64> = nd::array![
            [C64::new(1.0, 0.0), C64::new(0.0, 0.0)],
            [C64::new(0.0, 0.0), C64::new(-1.0, 0.0)],
        ];
        let ez = c.center_expectation1(&z).unwrap();
        assert_abs_diff_eq!(ez.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn normalization() {
        let mut psi = sample_state(3) * C64::new(3.0, 0.0);
        psi.update_error(0.09);
        let strategy = NO_TRUNCATION.with_normalization(true);
        let c = CanonicalMPS::new(psi.clone(), Some(1), Some(strategy)).unwrap();
        assert_abs_diff_eq!(c.norm_squared(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            c.error(), 0.09 / psi.norm_squared(), epsilon = 1e-12);
        let back: MPS<C64> = c.into();
        assert_abs_diff_eq!(back.norm_squared(), 1.0, epsilon = 1e-10);
    }
}
