//! Partial contractions of one chain against another.
//!
//! An environment is a matrix `ρ[b, a]` obtained by contracting a segment of a
//! "bra" chain (conjugated, index `b`) with the same segment of a "ket" chain
//! (index `a`) over all physical indices. Left environments cover sites to the
//! left of a bond and grow to the right; right environments cover sites to the
//! right of a bond and grow to the left. Both start from the 1 × 1 identity at
//! the open ends of the chain.
//!
//! ```text
//!  .-- B*[0] -- B*[1] -- ... -- B*[k-1] --  b
//!  |     |        |               |
//!  '--  A[0] -- A[1]  -- ... -- A[k-1]  --  a
//! ```
//!
//! Every update costs *O*(*d* *D*<sup>3</sup>), so full contractions are
//! linear in the number of sites.

use ndarray as nd;
use crate::{
    ComplexScalar,
    chain::{ MatrixProduct, TensorChain },
    linalg::{ fuse_left, fuse_right, reshape_matrix },
    mps::{ MPSError, MPSResult },
};

/// Return the trivial 1 × 1 environment found at either open end of a chain.
pub fn begin_environment<A>() -> nd::Array2<A>
where A: ComplexScalar
{
    nd::Array2::from_elem((1, 1), A::one())
}

/// Extend a left environment by one site.
///
/// `rho` has shape `(bra left bond, ket left bond)`; the result has shape
/// `(bra right bond, ket right bond)`.
pub fn update_left_environment<A>(
    bra: &nd::Array3<A>,
    ket: &nd::Array3<A>,
    rho: &nd::Array2<A>,
) -> nd::Array2<A>
where A: ComplexScalar
{
    let (_, d, r) = ket.dim();
    let b = rho.nrows();
    // { b, i<>a' } -> { b<>i, a' }
    let t = reshape_matrix(&rho.dot(&fuse_right(ket)), b * d, r);
    let bra_h = fuse_left(bra).t().mapv(|x| x.conjugate());
    bra_h.dot(&t)
}

/// Extend a right environment by one site.
///
/// `rho` has shape `(bra right bond, ket right bond)`; the result has shape
/// `(bra left bond, ket left bond)`.
pub fn update_right_environment<A>(
    bra: &nd::Array3<A>,
    ket: &nd::Array3<A>,
    rho: &nd::Array2<A>,
) -> nd::Array2<A>
where A: ComplexScalar
{
    let (l, d, _) = ket.dim();
    let b = rho.nrows();
    // { a<>i, b' } -> { a, i<>b' }
    let t = reshape_matrix(&fuse_left(ket).dot(&rho.t()), l, d * b);
    let bra_c = fuse_right(bra).mapv(|x| x.conjugate());
    bra_c.dot(&t.t())
}

/// Apply a single-site operator to the physical index of a site tensor.
pub fn apply_local<A>(op: &nd::Array2<A>, a: &nd::Array3<A>) -> nd::Array3<A>
where A: ComplexScalar
{
    let (l, d, r) = a.dim();
    nd::Array3::from_shape_fn((l, d, r), |(u, i, v)| {
        (0..d).fold(A::zero(), |acc, j| acc + op[[i, j]] * a[[u, j, v]])
    })
}

// contract two environments meeting on the same bond
fn close<A>(left: &nd::Array2<A>, right: &nd::Array2<A>) -> A
where A: ComplexScalar
{
    left.iter().zip(right.iter())
        .fold(A::zero(), |acc, (l, r)| acc + *l * *r)
}

pub(crate) fn scprod_chain<A>(bra: &TensorChain<A>, ket: &TensorChain<A>) -> A
where A: ComplexScalar
{
    let rho
        = bra.iter().zip(ket.iter())
        .fold(begin_environment(), |rho, (b, k)| {
            update_left_environment(b, k, &rho)
        });
    rho[[0, 0]]
}

fn check_compatible<A, L, R>(bra: &L, ket: &R) -> MPSResult<()>
where
    A: ComplexScalar,
    L: MatrixProduct<A> + ?Sized,
    R: MatrixProduct<A> + ?Sized,
{
    if bra.size() != ket.size() { return Err(MPSError::SiteCountMismatch); }
    if bra.physical_dimensions() != ket.physical_dimensions() {
        return Err(MPSError::PhysicalDimensionMismatch);
    }
    Ok(())
}

/// Compute the scalar product `⟨bra|ket⟩`.
///
/// Fails if the two states have different numbers of sites or different
/// physical dimensions.
pub fn scprod<A, L, R>(bra: &L, ket: &R) -> MPSResult<A>
where
    A: ComplexScalar,
    L: MatrixProduct<A> + ?Sized,
    R: MatrixProduct<A> + ?Sized,
{
    check_compatible(bra, ket)?;
    Ok(scprod_chain(bra.chain(), ket.chain()))
}

/// Return the norm environment of all sites strictly left of `site`.
pub(crate) fn left_environment_chain<A>(chain: &TensorChain<A>, site: usize)
    -> nd::Array2<A>
where A: ComplexScalar
{
    chain.iter().take(site)
        .fold(begin_environment(), |rho, a| update_left_environment(a, a, &rho))
}

/// Return the norm environment of all sites strictly right of `site`.
pub(crate) fn right_environment_chain<A>(chain: &TensorChain<A>, site: usize)
    -> nd::Array2<A>
where A: ComplexScalar
{
    chain.iter().skip(site + 1).rev()
        .fold(begin_environment(), |rho, a| update_right_environment(a, a, &rho))
}

fn check_operator<A>(op: &nd::Array2<A>, d: usize) -> MPSResult<()> {
    if op.dim() != (d, d) { return Err(MPSError::OperatorIncompatibleShape); }
    Ok(())
}

/// Compute `⟨ψ|O|ψ⟩` for an operator `O` acting on a single site.
///
/// The result is not divided by the norm of the state. Fails if `site` is out
/// of bounds or `op` is not a square matrix matching the site's physical
/// dimension.
pub fn expectation1<A, S>(state: &S, op: &nd::Array2<A>, site: usize)
    -> MPSResult<A>
where
    A: ComplexScalar,
    S: MatrixProduct<A> + ?Sized,
{
    let chain = state.chain();
    let a = chain.get(site).ok_or(MPSError::SiteOutOfBounds)?;
    check_operator(op, a.dim().1)?;
    let left = left_environment_chain(chain, site);
    let left = update_left_environment(a, &apply_local(op, a), &left);
    let right = right_environment_chain(chain, site);
    Ok(close(&left, &right))
}

/// Compute `⟨ψ|O|ψ⟩` for the same single-site operator placed on every site in
/// turn.
///
/// All right environments are computed once up front, so the total cost is
/// linear in the number of sites. Fails if any site has a physical dimension
/// that does not match `op`.
pub fn all_expectation1<A, S>(state: &S, op: &nd::Array2<A>)
    -> MPSResult<nd::Array1<A>>
where
    A: ComplexScalar,
    S: MatrixProduct<A> + ?Sized,
{
    let chain = state.chain();
    chain.iter().try_for_each(|a| check_operator(op, a.dim().1))?;
    let n = chain.size();
    let mut rights: Vec<nd::Array2<A>> = Vec::with_capacity(n);
    rights.push(begin_environment());
    for a in chain.iter().skip(1).rev() {
        let rho = update_right_environment(a, a, &rights[rights.len() - 1]);
        rights.push(rho);
    }
    rights.reverse();
    let mut left = begin_environment();
    let mut values = Vec::with_capacity(n);
    for (a, right) in chain.iter().zip(rights.iter()) {
        let local = update_left_environment(a, &apply_local(op, a), &left);
        values.push(close(&local, right));
        left = update_left_environment(a, a, &left);
    }
    Ok(nd::Array1::from(values))
}

/// Compute `⟨ψ|O₁ O₂|ψ⟩` for operators `O₁` on site `i` and `O₂` on site `j`.
///
/// If `i == j`, the operator product `O₁ · O₂` is applied to that site.
/// The result is not divided by the norm of the state.
pub fn expectation2<A, S>(
    state: &S,
    op1: &nd::Array2<A>,
    i: usize,
    op2: &nd::Array2<A>,
    j: usize,
) -> MPSResult<A>
where
    A: ComplexScalar,
    S: MatrixProduct<A> + ?Sized,
{
    let chain = state.chain();
    let di = chain.get(i).ok_or(MPSError::SiteOutOfBounds)?.dim().1;
    let dj = chain.get(j).ok_or(MPSError::SiteOutOfBounds)?.dim().1;
    check_operator(op1, di)?;
    check_operator(op2, dj)?;
    if i == j { return expectation1(state, &op1.dot(op2), i); }
    let (i, op1, j, op2) = if i < j { (i, op1, j, op2) } else { (j, op2, i, op1) };
    let mut rho = left_environment_chain(chain, i);
    rho = update_left_environment(&chain[i], &apply_local(op1, &chain[i]), &rho);
    for a in chain.iter().take(j).skip(i + 1) {
        rho = update_left_environment(a, a, &rho);
    }
    rho = update_left_environment(&chain[j], &apply_local(op2, &chain[j]), &rho);
    let right = right_environment_chain(chain, j);
    Ok(close(&rho, &right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;
    use crate::{ linalg::vdot, mps::MPS, strategy::NO_TRUNCATION };

    fn sample_state() -> MPS<C64> {
        let v: Vec<C64>
            = (0..12)
            .map(|k| C64::new((k as f64).cos(), (0.3 * k as f64).sin()))
            .collect();
        MPS::from_vector(v, &[2, 3, 2], NO_TRUNCATION, false).unwrap()
    }

    fn pauli_z() -> nd::Array2<C64> {
        nd::array![
            [C64::new(1.0, 0.0), C64::new(0.0, 0.0)],
            [C64::new(0.0, 0.0), C64::new(-1.0, 0.0)],
        ]
    }

    #[test]
    fn scprod_matches_dense() {
        let psi = sample_state();
        let phi = psi.conj();
        let dense = vdot(&phi.to_vector(), &psi.to_vector());
        let z: C64 = scprod(&phi, &psi).unwrap();
        assert_abs_diff_eq!((z - dense).norm(), 0.0, epsilon = 1e-10);
        let norm = vdot(&psi.to_vector(), &psi.to_vector()).re;
        assert_abs_diff_eq!(psi.norm_squared(), norm, epsilon = 1e-10);
    }

    #[test]
    fn scprod_rejects_mismatch() {
        let psi = sample_state();
        let other: MPS<C64>
            = MPS::from_vector(vec![C64::new(1.0, 0.0); 8], &[2, 2, 2], NO_TRUNCATION, false)
            .unwrap();
        assert!(matches!(
            scprod(&psi, &other),
            Err(MPSError::PhysicalDimensionMismatch)
        ));
    }

    #[test]
    fn environments_meet_at_every_bond() {
        let psi = sample_state();
        let total = psi.norm_squared();
        for k in 0..psi.size() {
            let left = update_left_environment(
                &psi.chain()[k],
                &psi.chain()[k],
                &left_environment_chain(psi.chain(), k),
            );
            let right = right_environment_chain(psi.chain(), k);
            assert_abs_diff_eq!(close(&left, &right).re, total, epsilon = 1e-10);
        }
    }

    #[test]
    fn local_expectations_match_dense() {
        let psi = sample_state();
        let z = pauli_z();
        let v = psi.to_vector();
        // Z on site 0 flips the sign of the second half
        let dense: f64
            = v.iter().enumerate()
            .map(|(k, vk)| if k < 6 { vk.norm_sqr() } else { -vk.norm_sqr() })
            .sum();
        let e0 = expectation1(&psi, &z, 0).unwrap();
        assert_abs_diff_eq!(e0.re, dense, epsilon = 1e-10);
        let all = all_expectation1(&psi, &z);
        assert!(matches!(all, Err(MPSError::OperatorIncompatibleShape)));

        // Z ⊗ Z on sites 0 and 2: sign (-1)^(s0 + s2)
        let dense2: f64
            = v.iter().enumerate()
            .map(|(k, vk)| {
                let s0 = k / 6;
                let s2 = k % 2;
                if (s0 + s2) % 2 == 0 { vk.norm_sqr() } else { -vk.norm_sqr() }
            })
            .sum();
        let e02 = expectation2(&psi, &z, 2, &z, 0).unwrap();
        assert_abs_diff_eq!(e02.re, dense2, epsilon = 1e-10);
        let same = expectation2(&psi, &z, 0, &z, 0).unwrap();
        assert_abs_diff_eq!(same.re, psi.norm_squared(), epsilon = 1e-10);
        assert!(matches!(
            expectation1(&psi, &z, 3),
            Err(MPSError::SiteOutOfBounds)
        ));
    }

    #[test]
    fn all_expectations_match_single() {
        let v: Vec<f64> = (0..16).map(|k| (k as f64 * 0.7).sin()).collect();
        let psi: MPS<f64> = MPS::from_vector(v, &[2; 4], NO_TRUNCATION, false).unwrap();
        let x: nd::Array2<f64> = nd::array![[0.0, 1.0], [1.0, 0.0]];
        let all = all_expectation1(&psi, &x).unwrap();
        for k in 0..4 {
            let ek = expectation1(&psi, &x, k).unwrap();
            assert_abs_diff_eq!(all[k], ek, epsilon = 1e-12);
        }
    }
}
