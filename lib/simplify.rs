//! Compression of linear combinations of states.
//!
//! Given weights `w_i` and states `|ψ_i⟩`, [`combine`] looks for a single
//! state `|φ⟩` with bond dimensions bounded by a [`Strategy`] that minimizes
//! ```text
//! ‖ Σ_i w_i |ψ_i⟩ − |φ⟩ ‖²
//! ```
//! How hard it tries depends on [`Strategy::simplification`]:
//! - [`Simplification::DoNotSimplify`] stacks the tensors of all terms into
//!   the exact direct-sum state, whose bonds are the sums of the input bonds;
//! - [`Simplification::CanonicalForm`] brings that direct sum into truncated
//!   canonical form once;
//! - [`Simplification::Variational`] starts from an initial guess and refines
//!   it with two-site alternating least-squares sweeps. At every pair of sites,
//!   the exact local solution
//!   ```text
//!   T = Σ_i w_i L_i ψ_i[k] ψ_i[k + 1] R_i
//!   ```
//!   is computed from the environments `L_i`, `R_i` of the guess against each
//!   term, then split back into two sites with a truncated SVD.
//!
//! Sweeps stop once the relative residual `‖t − φ‖² / ‖t‖²` falls below
//! [`Strategy::simplification_tolerance`], once it stops changing by more than
//! that tolerance, once it grows, or after [`Strategy::max_sweeps`] sweeps.
//! Running out of sweeps is not an error; the [`Combined`] report says whether
//! the iteration converged.
//!
//! The error of the result combines the error bounds of the inputs,
//! `(Σ_i |w_i| √e_i)²`, with the residual of the compression.

use std::borrow::Borrow;
use log::{ debug, warn };
use ndarray as nd;
use crate::{
    ComplexScalar,
    canonical::{ CanonicalMPS, canonicalize },
    chain::{ MatrixProduct, TensorChain },
    environment::{
        begin_environment,
        scprod_chain,
        update_left_environment,
        update_right_environment,
    },
    linalg::{ fuse_left, fuse_right, norm_sq, reshape_matrix, split_left, vdot },
    mps::{ MPS, MPSError, MPSResult },
    strategy::{ Simplification, Strategy, Truncation },
    truncate::combine_errors,
};

/// Result of a combination, with convergence diagnostics.
#[derive(Clone, Debug)]
pub struct Combined<A> {
    /// The combined state. Its error includes the input errors and the
    /// residual.
    pub state: MPS<A>,
    /// Final relative residual `‖t − φ‖² / ‖t‖²`, or zero for exact modes.
    pub residual: f64,
    /// Number of sweeps performed.
    pub sweeps: usize,
    /// Whether the stopping criterion was met before running out of sweeps.
    pub converged: bool,
}

/// Starting point for variational combination.
#[derive(Clone, Debug)]
pub enum InitialGuess<A> {
    /// The truncated canonical form of the direct sum of all terms.
    DirectSum,
    /// The term with the largest weight magnitude.
    LargestWeight,
    /// An explicit state, which must have the same sites and physical
    /// dimensions as the terms.
    State(MPS<A>),
}

impl<A> Default for InitialGuess<A> {
    fn default() -> Self { Self::DirectSum }
}

/// Build the exact direct-sum state `Σ_i w_i |ψ_i⟩`.
///
/// The first site stacks the weighted tensors along the right bond, the last
/// site along the left bond, and every site in between is block-diagonal. The
/// result carries the combined input error `(Σ_i |w_i| √e_i)²` and the first
/// state's strategy. All states are assumed to share their physical
/// dimensions.
pub(crate) fn direct_sum<A, S>(weights: &[A], states: &[S]) -> MPS<A>
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    let first: &MPS<A> = states[0].borrow();
    let n = first.size();
    let dims = first.physical_dimensions();
    let error = input_error(weights, states);
    let strategy = first.strategy;
    if n == 1 {
        let mut a = nd::Array3::<A>::zeros((1, dims[0], 1));
        weights.iter().zip(states.iter())
            .for_each(|(w, psi)| { a.scaled_add(*w, &psi.borrow().chain.data[0]); });
        return MPS::from_chain(TensorChain::from_vec_unchecked(vec![a]), error, strategy);
    }

    // bonds[i][k] = dimension of bond k (left of site k) of state i
    let bonds: Vec<Vec<usize>>
        = states.iter().map(|psi| psi.borrow().bond_dimensions()).collect();
    let totals: Vec<usize>
        = (0..=n)
        .map(|k| {
            if k == 0 || k == n { 1 } else { bonds.iter().map(|b| b[k]).sum() }
        })
        .collect();
    let mut data: Vec<nd::Array3<A>> = Vec::with_capacity(n);
    for (k, d) in dims.iter().enumerate() {
        let mut out = nd::Array3::<A>::zeros((totals[k], *d, totals[k + 1]));
        let mut lo: usize = 0;
        let mut ro: usize = 0;
        for (i, psi) in states.iter().enumerate() {
            let a = &psi.borrow().chain.data[k];
            let (l, _, r) = a.dim();
            let lo_k = if k == 0 { 0 } else { lo };
            let ro_k = if k == n - 1 { 0 } else { ro };
            let mut block
                = out.slice_mut(nd::s![lo_k..lo_k + l, .., ro_k..ro_k + r]);
            if k == 0 {
                block.assign(&a.mapv(|x| x * weights[i]));
            } else {
                block.assign(a);
            }
            lo += l;
            ro += r;
        }
        data.push(out);
    }
    MPS::from_chain(TensorChain::from_vec_unchecked(data), error, strategy)
}

fn input_error<A, S>(weights: &[A], states: &[S]) -> f64
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    let r: f64
        = weights.iter().zip(states.iter())
        .map(|(w, psi)| w.modulus() * psi.borrow().error.sqrt())
        .sum();
    r * r
}

// ‖Σ_i w_i ψ_i‖², from pairwise overlaps
fn target_norm_squared<A, S>(weights: &[A], states: &[S]) -> f64
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    let mut total = A::zero();
    for (wi, psi) in weights.iter().zip(states.iter()) {
        for (wj, phi) in weights.iter().zip(states.iter()) {
            let overlap = scprod_chain(&psi.borrow().chain, &phi.borrow().chain);
            total += wi.conjugate() * *wj * overlap;
        }
    }
    total.real().max(0.0)
}

fn validate<A, S>(weights: &[A], states: &[S], guess: &InitialGuess<A>)
    -> MPSResult<()>
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    if states.is_empty() { return Err(MPSError::EmptyCombination); }
    if weights.len() != states.len() { return Err(MPSError::WeightsMismatch); }
    let first: &MPS<A> = states[0].borrow();
    let n = first.size();
    let dims = first.physical_dimensions();
    let check = |psi: &MPS<A>| -> MPSResult<()> {
        if psi.size() != n { return Err(MPSError::SiteCountMismatch); }
        if psi.physical_dimensions() != dims {
            return Err(MPSError::PhysicalDimensionMismatch);
        }
        Ok(())
    };
    states.iter().try_for_each(|psi| check(psi.borrow()))?;
    if let InitialGuess::State(g) = guess { check(g)?; }
    Ok(())
}

// a lone unit-weight state that nothing would change
fn is_noop<A, S>(weights: &[A], states: &[S], strategy: &Strategy) -> bool
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    states.len() == 1
        && weights[0] == A::one()
        && !strategy.normalize
        && strategy.truncation == Truncation::DoNotTruncate
        && states[0].borrow().max_bond_dimension() <= strategy.max_bond_dimension
}

/// Per-term environments of the guess against every term of the sum.
///
/// `lefts[i][k]` covers sites `< k` and `rights[i][k]` covers sites `> k`.
/// Entries are only valid on the side of the guess that has not been touched
/// since they were computed.
struct SumEnvironments<'a, A> {
    weights: &'a [A],
    states: Vec<&'a TensorChain<A>>,
    lefts: Vec<Vec<nd::Array2<A>>>,
    rights: Vec<Vec<nd::Array2<A>>>,
}

impl<'a, A> SumEnvironments<'a, A>
where A: ComplexScalar
{
    // environments for a guess with its center at site 0
    fn new<S>(weights: &'a [A], states: &'a [S], guess: &TensorChain<A>) -> Self
    where S: Borrow<MPS<A>>
    {
        let n = guess.size();
        let states: Vec<&TensorChain<A>>
            = states.iter().map(|psi| &psi.borrow().chain).collect();
        let lefts: Vec<Vec<nd::Array2<A>>>
            = states.iter().map(|_| vec![begin_environment(); n]).collect();
        let rights: Vec<Vec<nd::Array2<A>>>
            = states.iter()
            .map(|psi| {
                let mut r = vec![begin_environment(); n];
                for k in (0..n - 1).rev() {
                    r[k] = update_right_environment(
                        &guess[k + 1], &psi[k + 1], &r[k + 1]);
                }
                r
            })
            .collect();
        Self { weights, states, lefts, rights }
    }

    // optimal two-site tensor for sites `k`, `k + 1` :: { b, s1, s2, c }
    fn two_site(&self, k: usize) -> nd::Array4<A> {
        let mut acc: Option<nd::Array2<A>> = None;
        let mut shape = (0, 0, 0, 0);
        for (i, psi) in self.states.iter().enumerate() {
            let left = &self.lefts[i][k];
            let right = &self.rights[i][k + 1];
            let (_, d1, x) = psi[k].dim();
            let (_, d2, _) = psi[k + 1].dim();
            let b = left.nrows();
            let c = right.nrows();
            // { b, s1<>x } -> { b<>s1, x }
            let m1 = reshape_matrix(&left.dot(&fuse_right(&psi[k])), b * d1, x);
            // { x<>s2, c } -> { x, s2<>c }
            let m2 = reshape_matrix(&fuse_left(&psi[k + 1]).dot(&right.t()), x, d2 * c);
            let term = m1.dot(&m2);
            shape = (b, d1, d2, c);
            match acc.as_mut() {
                Some(t) => { t.scaled_add(self.weights[i], &term); },
                None => { acc = Some(term * self.weights[i]); },
            }
        }
        let (b, d1, d2, c) = shape;
        let t = acc.unwrap_or_else(|| nd::Array2::zeros((b * d1, d2 * c)));
        nd::Array4::from_shape_fn(shape, |(u, s1, s2, v)| t[[u * d1 + s1, s2 * c + v]])
    }

    // projection of the sum onto the guess environments at site `k`
    fn one_site(&self, k: usize) -> nd::Array3<A> {
        let mut acc: Option<nd::Array2<A>> = None;
        let mut shape = (0, 0);
        for (i, psi) in self.states.iter().enumerate() {
            let left = &self.lefts[i][k];
            let right = &self.rights[i][k];
            let (_, d, a) = psi[k].dim();
            let b = left.nrows();
            let m = reshape_matrix(&left.dot(&fuse_right(&psi[k])), b * d, a);
            let term = m.dot(&right.t());
            shape = (b, d);
            match acc.as_mut() {
                Some(t) => { t.scaled_add(self.weights[i], &term); },
                None => { acc = Some(term * self.weights[i]); },
            }
        }
        let (b, d) = shape;
        let t = acc.unwrap_or_else(|| nd::Array2::zeros((b * d, 1)));
        split_left(&t, b, d)
    }

    // after site `k` of the guess has been fixed during a left-to-right sweep
    fn update_left(&mut self, k: usize, g: &nd::Array3<A>) {
        for (i, psi) in self.states.iter().enumerate() {
            let next = update_left_environment(g, &psi[k], &self.lefts[i][k]);
            self.lefts[i][k + 1] = next;
        }
    }

    // after site `k` of the guess has been fixed during a right-to-left sweep
    fn update_right(&mut self, k: usize, g: &nd::Array3<A>) {
        for (i, psi) in self.states.iter().enumerate() {
            let next = update_right_environment(g, &psi[k], &self.rights[i][k]);
            self.rights[i][k - 1] = next;
        }
    }
}

// rescale the first tensor to unit norm and the error accordingly
fn normalize_state<A>(state: &mut MPS<A>) -> MPSResult<f64>
where A: ComplexScalar
{
    let norm2 = state.norm_squared();
    if norm2 == 0.0 { return Err(MPSError::ZeroNorm); }
    let norm = norm2.sqrt();
    state.chain.data[0].mapv_inplace(|a| a.unscale(norm));
    state.error /= norm2;
    Ok(norm2)
}

fn exact_combination<A, S>(weights: &[A], states: &[S], strategy: &Strategy)
    -> MPSResult<Combined<A>>
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    let mut state = direct_sum(weights, states);
    state.strategy = *strategy;
    if strategy.normalize { normalize_state(&mut state)?; }
    Ok(Combined { state, residual: 0.0, sweeps: 0, converged: true })
}

fn canonical_combination<A, S>(weights: &[A], states: &[S], strategy: &Strategy)
    -> MPSResult<Combined<A>>
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    let target = direct_sum(weights, states);
    let norm2 = target_norm_squared(weights, states);
    let error = target.error;
    let mut data = target.chain.into_inner();
    let discarded = canonicalize(&mut data, 0, strategy);
    let mut state = MPS::from_chain(
        TensorChain::from_vec_unchecked(data),
        combine_errors(error, discarded),
        *strategy,
    );
    if strategy.normalize { normalize_state(&mut state)?; }
    let residual = if norm2 > 0.0 { discarded / norm2 } else { 0.0 };
    Ok(Combined { state, residual, sweeps: 0, converged: true })
}

fn initial_guess<A, S>(
    weights: &[A],
    states: &[S],
    guess: InitialGuess<A>,
    strategy: &Strategy,
) -> CanonicalMPS<A>
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    let start: MPS<A>
        = match guess {
            InitialGuess::DirectSum => direct_sum(weights, states),
            InitialGuess::LargestWeight => {
                let (_, psi)
                    = weights.iter().zip(states.iter())
                    .fold((-1.0, &states[0]), |(wmax, best), (w, psi)| {
                        let wm = w.modulus();
                        if wm > wmax { (wm, psi) } else { (wmax, best) }
                    });
                psi.borrow().clone()
            },
            InitialGuess::State(g) => g,
        };
    let mut data = start.chain.into_inner();
    canonicalize(&mut data, 0, strategy);
    CanonicalMPS {
        chain: TensorChain::from_vec_unchecked(data),
        center: 0,
        error: 0.0,
        strategy: *strategy,
    }
}

// ‖t − g‖² = ‖t‖² + ‖g‖² − 2 Re⟨g|t⟩, with all of ‖g‖ in the center
fn center_residual<A>(g: &CanonicalMPS<A>, envs: &SumEnvironments<'_, A>, norm2: f64)
    -> f64
where A: ComplexScalar
{
    let c = g.center;
    let center = &g.chain.data[c];
    let overlap = vdot(center, &envs.one_site(c));
    (norm2 + norm_sq(center) - 2.0 * overlap.real()).max(0.0)
}

fn variational_combination<A, S>(
    weights: &[A],
    states: &[S],
    guess: InitialGuess<A>,
    strategy: &Strategy,
) -> MPSResult<Combined<A>>
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    let n = states[0].borrow().size();
    if n == 1 { return exact_combination(weights, states, strategy); }
    let in_error = input_error(weights, states);
    let norm2 = target_norm_squared(weights, states);
    let relative = |residual: f64| -> f64 {
        if norm2 > 0.0 { residual / norm2 } else { residual }
    };
    let tol = strategy.simplification_tolerance;

    let mut g = initial_guess(weights, states, guess, strategy);
    let mut envs = SumEnvironments::new(weights, states, &g.chain);
    let mut residual = relative(center_residual(&g, &envs, norm2));
    debug!("initial guess: relative residual {residual:e}");
    let mut sweeps: usize = 0;
    let mut converged = residual <= tol;
    let mut direction_right = true;
    while !converged && sweeps < strategy.max_sweeps {
        let previous = (g.chain.clone(), g.center);
        if direction_right {
            for k in 0..n - 1 {
                let t = envs.two_site(k);
                g.update_2site_right(&t, k, strategy)?;
                envs.update_left(k, &g.chain.data[k]);
            }
        } else {
            for k in (0..n - 1).rev() {
                let t = envs.two_site(k);
                g.update_2site_left(&t, k, strategy)?;
                envs.update_right(k + 1, &g.chain.data[k + 1]);
            }
        }
        sweeps += 1;
        direction_right = !direction_right;

        let rel = relative(center_residual(&g, &envs, norm2));
        debug!(
            "sweep {sweeps}: relative residual {rel:e}, max bond dimension {}",
            g.max_bond_dimension(),
        );
        let grew = rel > residual;
        converged = rel <= tol || (residual - rel).abs() <= tol;
        if grew {
            // environments are stale from here on
            (g.chain, g.center) = previous;
            break;
        }
        residual = rel;
    }
    if !converged && sweeps >= strategy.max_sweeps {
        warn!(
            "combination did not converge after {sweeps} sweeps \
            (relative residual {residual:e})"
        );
    }

    let abs_residual = if norm2 > 0.0 { residual * norm2 } else { residual };
    let mut state = MPS::from_chain(
        g.chain,
        combine_errors(in_error, abs_residual),
        *strategy,
    );
    if strategy.normalize { normalize_state(&mut state)?; }
    Ok(Combined { state, residual, sweeps, converged })
}

/// Compress the weighted sum `Σ_i w_i |ψ_i⟩` into a single state.
///
/// `guess` is only used by [`Simplification::Variational`]. A single state
/// with unit weight is returned unchanged only if the strategy's truncation
/// mode is [`Truncation::DoNotTruncate`], it does not normalize, and the
/// state's bonds already fit under the cap. Under any other truncation mode,
/// including that of [`DEFAULT_STRATEGY`](crate::strategy::DEFAULT_STRATEGY),
/// a lone state is still swept and comes back regauged, possibly with smaller
/// bonds.
///
/// A variational combination that runs out of sweeps, including
/// `max_sweeps == 0`, returns its best guess so far; its error still accounts
/// for the measured residual of that guess.
///
/// Fails if no states are given, the numbers of weights and states differ, or
/// the states (or an explicit guess) differ in number of sites or physical
/// dimensions. Normalizing a zero result fails with [`MPSError::ZeroNorm`].
pub fn combine<A, S>(
    weights: &[A],
    states: &[S],
    guess: InitialGuess<A>,
    strategy: &Strategy,
) -> MPSResult<Combined<A>>
where
    A: ComplexScalar,
    S: Borrow<MPS<A>>,
{
    validate(weights, states, &guess)?;
    if is_noop(weights, states, strategy) {
        let mut state = states[0].borrow().clone();
        state.strategy = *strategy;
        return Ok(Combined { state, residual: 0.0, sweeps: 0, converged: true });
    }
    match strategy.simplification {
        Simplification::DoNotSimplify
            => exact_combination(weights, states, strategy),
        Simplification::CanonicalForm
            => canonical_combination(weights, states, strategy),
        Simplification::Variational
            => variational_combination(weights, states, guess, strategy),
    }
}

/// Compress a single state.
///
/// Equivalent to [`combine`] with one unit-weight term and the default
/// initial guess.
pub fn simplify<A>(state: &MPS<A>, strategy: &Strategy) -> MPSResult<Combined<A>>
where A: ComplexScalar
{
    combine(&[A::one()], std::slice::from_ref(state), InitialGuess::DirectSum, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::{
        factories::{ product_state, random_mps },
        linalg::distance,
        strategy::{ DEFAULT_STRATEGY, NO_TRUNCATION },
    };

    fn unit(k: usize) -> MPS<f64> {
        let mut v = [0.0; 2];
        v[k] = 1.0;
        MPS::from_vector(v, &[2], NO_TRUNCATION, false).unwrap()
    }

    #[test]
    fn validation() {
        let none: [MPS<f64>; 0] = [];
        assert!(matches!(
            combine(&[], &none, InitialGuess::default(), &DEFAULT_STRATEGY),
            Err(MPSError::EmptyCombination)
        ));
        assert!(matches!(
            combine(&[1.0], &[unit(0), unit(1)], InitialGuess::default(), &DEFAULT_STRATEGY),
            Err(MPSError::WeightsMismatch)
        ));
        let three: MPS<f64>
            = MPS::from_vector([1.0, 0.0, 0.0], &[3], NO_TRUNCATION, false).unwrap();
        assert!(matches!(
            combine(&[1.0, 1.0], &[unit(0), three], InitialGuess::default(), &DEFAULT_STRATEGY),
            Err(MPSError::PhysicalDimensionMismatch)
        ));
    }

    #[test]
    fn single_site_sum() {
        let states = [unit(0), unit(1)];
        let plain = combine(&[1.0, 1.0], &states, InitialGuess::default(), &DEFAULT_STRATEGY)
            .unwrap();
        assert_eq!(plain.state.to_vector().to_vec(), vec![1.0, 1.0]);
        let normalized = combine(
            &[1.0, 1.0],
            &states,
            InitialGuess::default(),
            &DEFAULT_STRATEGY.with_normalization(true),
        ).unwrap();
        let s = 0.5_f64.sqrt();
        let v = normalized.state.to_vector();
        assert_abs_diff_eq!(v[0], s, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], s, epsilon = 1e-12);
    }

    #[test]
    fn noop_returns_input() {
        let mut rng = StdRng::seed_from_u64(10);
        let psi: MPS<C64> = random_mps(&[2; 5], 3, &mut rng).unwrap();
        let strategy = NO_TRUNCATION.with_simplification(Simplification::Variational);
        let out = combine(&[C64::new(1.0, 0.0)], &[&psi], InitialGuess::default(), &strategy)
            .unwrap();
        assert_eq!(out.state.chain, psi.chain);
        assert_eq!(out.sweeps, 0);
        assert_eq!(out.residual, 0.0);
    }

    #[test]
    fn lone_state_is_regauged_when_truncating() {
        let mut rng = StdRng::seed_from_u64(17);
        let psi: MPS<f64> = random_mps(&[2; 5], 3, &mut rng).unwrap();
        let out = simplify(&psi, &DEFAULT_STRATEGY).unwrap();
        assert_ne!(out.state.chain, psi.chain);
        assert_abs_diff_eq!(
            distance(&out.state.to_vector(), &psi.to_vector()), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn direct_sum_is_exact() {
        let mut rng = StdRng::seed_from_u64(11);
        let a: MPS<C64> = random_mps(&[2, 3, 2, 2], 2, &mut rng).unwrap();
        let b: MPS<C64> = random_mps(&[2, 3, 2, 2], 3, &mut rng).unwrap();
        let w = [C64::new(0.5, 0.0), C64::new(0.0, -2.0)];
        let out = combine(&w, &[&a, &b], InitialGuess::default(), &NO_TRUNCATION).unwrap();
        let expected = a.to_vector() * w[0] + b.to_vector() * w[1];
        assert_abs_diff_eq!(
            distance(&out.state.to_vector(), &expected), 0.0, epsilon = 1e-10);
        let bonds_a = a.bond_dimensions();
        let bonds_b = b.bond_dimensions();
        let bonds = out.state.bond_dimensions();
        for k in 1..4 {
            assert_eq!(bonds[k], bonds_a[k] + bonds_b[k]);
        }
    }

    #[test]
    fn variational_sum_of_identical_states() {
        let mut rng = StdRng::seed_from_u64(12);
        let psi: MPS<C64> = random_mps(&[2; 6], 4, &mut rng).unwrap();
        let one = C64::new(1.0, 0.0);
        for guess in [InitialGuess::DirectSum, InitialGuess::LargestWeight] {
            let out = combine(&[one, one], &[&psi, &psi], guess, &DEFAULT_STRATEGY)
                .unwrap();
            let expected = psi.to_vector() * C64::new(2.0, 0.0);
            assert_abs_diff_eq!(
                distance(&out.state.to_vector(), &expected), 0.0, epsilon = 1e-8);
            assert!(out.residual < 1e-10);
            assert!(out.state.max_bond_dimension() <= 4);
        }
    }

    #[test]
    fn variational_respects_cap() {
        let mut rng = StdRng::seed_from_u64(13);
        let a: MPS<f64> = random_mps(&[2; 8], 4, &mut rng).unwrap();
        let b: MPS<f64> = random_mps(&[2; 8], 4, &mut rng).unwrap();
        let strategy = DEFAULT_STRATEGY
            .with_max_bond_dimension(3)
            .with_max_sweeps(6);
        let out = combine(&[1.0, -0.5], &[&a, &b], InitialGuess::default(), &strategy)
            .unwrap();
        assert!(out.state.max_bond_dimension() <= 3);
        assert!(out.sweeps >= 1 && out.sweeps <= 6);
        let exact = a.to_vector() - b.to_vector() * 0.5;
        let dist = distance(&out.state.to_vector(), &exact);
        let norm2 = exact.dot(&exact);
        assert_abs_diff_eq!(dist * dist / norm2, out.residual, epsilon = 1e-8);
        assert!(out.state.error() >= dist * dist * (1.0 - 1e-8));
    }

    #[test]
    fn canonical_mode_truncates_once() {
        let mut rng = StdRng::seed_from_u64(14);
        let a: MPS<f64> = random_mps(&[2; 6], 3, &mut rng).unwrap();
        let strategy = DEFAULT_STRATEGY
            .with_simplification(Simplification::CanonicalForm)
            .with_max_bond_dimension(2);
        let out = simplify(&a, &strategy).unwrap();
        assert!(out.state.max_bond_dimension() <= 2);
        let dist = distance(&out.state.to_vector(), &a.to_vector());
        assert!(dist * dist <= out.state.error() * (1.0 + 1e-8) + 1e-14);
        assert_eq!(out.sweeps, 0);
    }

    #[test]
    fn explicit_guess_is_validated() {
        let mut rng = StdRng::seed_from_u64(15);
        let a: MPS<f64> = random_mps(&[2; 4], 2, &mut rng).unwrap();
        let g: MPS<f64> = random_mps(&[2; 3], 2, &mut rng).unwrap();
        assert!(matches!(
            combine(&[1.0, 1.0], &[&a, &a], InitialGuess::State(g), &DEFAULT_STRATEGY),
            Err(MPSError::SiteCountMismatch)
        ));
        // full bond dimensions span the whole space
        let g: MPS<f64> = random_mps(&[2; 4], 4, &mut rng).unwrap();
        let out = combine(&[1.0, 1.0], &[&a, &a], InitialGuess::State(g), &DEFAULT_STRATEGY)
            .unwrap();
        let expected = a.to_vector() * 2.0;
        assert_abs_diff_eq!(
            distance(&out.state.to_vector(), &expected), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn zero_sweeps_still_bound_the_error() {
        let a: MPS<f64> = product_state([[1.0, 0.0], [1.0, 0.0]]).unwrap();
        let b: MPS<f64> = product_state([[0.0, 1.0], [0.0, 1.0]]).unwrap();
        let strategy = Strategy { max_sweeps: 0, ..DEFAULT_STRATEGY };
        let out = combine(&[2.0, 1.0], &[&a, &b], InitialGuess::LargestWeight, &strategy)
            .unwrap();
        assert_eq!(out.sweeps, 0);
        assert!(!out.converged);
        let exact = a.to_vector() * 2.0 + b.to_vector();
        let dist = distance(&out.state.to_vector(), &exact);
        assert!(dist * dist >= 2.0 - 1e-10);
        assert!(out.state.error() >= dist * dist * (1.0 - 1e-10));
        assert_abs_diff_eq!(out.residual, dist * dist / 5.0, epsilon = 1e-10);
    }

    #[test]
    fn sweeping_never_loses_to_the_initial_guess() {
        let mut rng = StdRng::seed_from_u64(16);
        for _ in 0..8 {
            let states: Vec<MPS<f64>>
                = (0..3).map(|_| random_mps(&[2; 7], 3, &mut rng).unwrap()).collect();
            let w = [1.0, -0.7, 0.4];
            let capped = DEFAULT_STRATEGY.with_max_bond_dimension(2);
            let start = combine(
                &w, &states, InitialGuess::default(), &Strategy { max_sweeps: 0, ..capped },
            ).unwrap();
            let out = combine(&w, &states, InitialGuess::default(), &capped.with_max_sweeps(8))
                .unwrap();
            assert!(out.residual <= start.residual + 1e-12);
            let exact = states[0].to_vector() * w[0]
                + states[1].to_vector() * w[1]
                + states[2].to_vector() * w[2];
            let dist = distance(&out.state.to_vector(), &exact);
            assert_abs_diff_eq!(out.residual, dist * dist / exact.dot(&exact), epsilon = 1e-8);
        }
    }
}
