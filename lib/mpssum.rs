//! Deferred linear combinations of matrix product states.
//!
//! Adding or subtracting states never touches their tensors. Instead, an
//! [`MPSSum`] records the weights and (shared, read-only) states, and the actual
//! compression into a single [`MPS`] happens only when asked for, through
//! [`MPSSum::to_mps`] or [`MPSSum::collapse`].
//!
//! ```
//! use mps_engine::*;
//!
//! let a: MPS<f64> = MPS::from_vector([1.0, 0.0], &[2], NO_TRUNCATION, false)
//!     .unwrap();
//! let b: MPS<f64> = MPS::from_vector([0.0, 1.0], &[2], NO_TRUNCATION, false)
//!     .unwrap();
//! let sum = ((&a + &b).unwrap() - a.clone()).unwrap();
//! assert_eq!(sum.weights(), &[1.0, 1.0, -1.0]);
//! assert_eq!(sum.to_vector().unwrap().to_vec(), vec![0.0, 1.0]);
//! ```
//!
//! For arithmetic whose operand kinds are only known at runtime, wrap values
//! in [`Operand`].

use std::{
    fmt,
    ops::{ Add, Mul, Neg, Sub },
    sync::Arc,
};
use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    ComplexScalar,
    chain::MatrixProduct,
    environment::scprod,
    mps::{ MPS, MPSError, MPSResult },
    simplify::{ self, Combined, InitialGuess },
    strategy::Strategy,
};

/// A weighted sum of matrix product states, `Σ_i w_i |ψ_i⟩`.
///
/// Always holds at least one state, and all states have the same number of
/// sites. Physical dimensions are checked when the sum is evaluated.
#[derive(Clone, Debug)]
pub struct MPSSum<A> {
    weights: Vec<A>,
    states: Vec<Arc<MPS<A>>>,
    strategy: Strategy,
}

impl<A> From<MPS<A>> for MPSSum<A>
where A: ComplexScalar
{
    fn from(state: MPS<A>) -> Self {
        let strategy = state.strategy();
        Self { weights: vec![A::one()], states: vec![Arc::new(state)], strategy }
    }
}

impl<A> From<&MPS<A>> for MPSSum<A>
where A: ComplexScalar
{
    fn from(state: &MPS<A>) -> Self { Self::from(state.clone()) }
}

impl<A> MPSSum<A>
where A: ComplexScalar
{
    /// Create a new sum.
    ///
    /// Fails if no states are given, the numbers of weights and states differ,
    /// or the states have different numbers of sites.
    pub fn new<I, J>(weights: I, states: J, strategy: Strategy) -> MPSResult<Self>
    where
        I: IntoIterator<Item = A>,
        J: IntoIterator<Item = MPS<A>>,
    {
        Self::from_shared(weights, states.into_iter().map(Arc::new), strategy)
    }

    /// Like [`Self::new`], but for states that are already shared.
    pub fn from_shared<I, J>(weights: I, states: J, strategy: Strategy)
        -> MPSResult<Self>
    where
        I: IntoIterator<Item = A>,
        J: IntoIterator<Item = Arc<MPS<A>>>,
    {
        let weights: Vec<A> = weights.into_iter().collect();
        let states: Vec<Arc<MPS<A>>> = states.into_iter().collect();
        if states.is_empty() { return Err(MPSError::EmptyCombination); }
        if weights.len() != states.len() {
            return Err(MPSError::WeightsMismatch);
        }
        let n = states[0].size();
        if states.iter().any(|psi| psi.size() != n) {
            return Err(MPSError::SiteCountMismatch);
        }
        Ok(Self { weights, states, strategy })
    }

    /// Return the weights.
    pub fn weights(&self) -> &[A] { &self.weights }

    /// Return the states.
    pub fn states(&self) -> &[Arc<MPS<A>>] { &self.states }

    /// Return the number of terms in the sum.
    pub fn len(&self) -> usize { self.states.len() }

    /// Always `false`: a sum holds at least one state.
    pub fn is_empty(&self) -> bool { self.states.is_empty() }

    /// Return the number of sites of each state.
    pub fn size(&self) -> usize { self.states[0].size() }

    /// Return the strategy attached to this sum.
    pub fn strategy(&self) -> Strategy { self.strategy }

    /// Return a copy with a different attached strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Return the error bound of the sum implied by the error bounds of its
    /// terms, `(Σ_i |w_i| √e_i)²`.
    pub fn error(&self) -> f64 {
        let r: f64
            = self.weights.iter().zip(self.states.iter())
            .map(|(w, psi)| w.modulus() * psi.error().sqrt())
            .sum();
        r * r
    }

    /// Multiply every weight by a scalar.
    pub fn scale(mut self, c: A) -> Self {
        self.weights.iter_mut().for_each(|w| { *w *= c; });
        self
    }

    /// Return the complex conjugate of the sum.
    pub fn conj(&self) -> Self {
        Self {
            weights: self.weights.iter().map(|w| w.conjugate()).collect(),
            states: self.states.iter().map(|psi| Arc::new(psi.conj())).collect(),
            strategy: self.strategy,
        }
    }

    // concatenate the terms of `other`, with weights multiplied by `sign`
    fn append(mut self, other: Self, sign: A) -> MPSResult<Self> {
        if self.size() != other.size() {
            return Err(MPSError::SiteCountMismatch);
        }
        self.weights.extend(other.weights.into_iter().map(|w| w * sign));
        self.states.extend(other.states);
        Ok(self)
    }

    fn check_physical_dimensions(&self) -> MPSResult<()> {
        let dims = self.states[0].physical_dimensions();
        if self.states.iter().any(|psi| psi.physical_dimensions() != dims) {
            return Err(MPSError::PhysicalDimensionMismatch);
        }
        Ok(())
    }

    /// Contract into a dense state vector by summing the weighted vectors of
    /// all terms.
    ///
    /// This costs memory exponential in the number of sites. Fails if the
    /// states have different physical dimensions.
    pub fn to_vector(&self) -> MPSResult<nd::Array1<A>> {
        self.check_physical_dimensions()?;
        let mut acc: nd::Array1<A> = self.states[0].to_vector() * self.weights[0];
        self.weights.iter().zip(self.states.iter()).skip(1)
            .for_each(|(w, psi)| { acc.scaled_add(*w, &psi.to_vector()); });
        Ok(acc)
    }

    /// Return `|⟨Σ|Σ⟩|` from the pairwise scalar products of the terms.
    ///
    /// This costs *O*(*N*<sup>2</sup>) scalar products for *N* terms.
    pub fn norm_squared(&self) -> MPSResult<f64> {
        let mut total = A::zero();
        for (wi, psi) in self.weights.iter().zip(self.states.iter()) {
            for (wj, phi) in self.weights.iter().zip(self.states.iter()) {
                let overlap: A = scprod(psi.as_ref(), phi.as_ref())?;
                total += wi.conjugate() * *wj * overlap;
            }
        }
        Ok(total.modulus())
    }

    /// Materialize the sum as a single state using the combination engine.
    ///
    /// `strategy` defaults to the sum's own strategy, and `normalize`, if
    /// given, overrides its normalization flag.
    pub fn to_mps(&self, normalize: Option<bool>, strategy: Option<Strategy>)
        -> MPSResult<MPS<A>>
    {
        let mut strategy = strategy.unwrap_or(self.strategy);
        if let Some(normalize) = normalize {
            strategy = strategy.with_normalization(normalize);
        }
        simplify::combine(
            &self.weights,
            &self.states,
            InitialGuess::DirectSum,
            &strategy,
        )
        .map(|combined| combined.state)
    }

    /// Materialize the sum under its own strategy, returning the full
    /// convergence report.
    pub fn collapse(&self) -> MPSResult<Combined<A>> {
        simplify::combine(
            &self.weights,
            &self.states,
            InitialGuess::DirectSum,
            &self.strategy,
        )
    }

    /// Build the exact direct-sum state, whose bond dimensions are the sums of
    /// the bond dimensions of the terms.
    pub fn join(&self) -> MPSResult<MPS<A>> {
        self.check_physical_dimensions()?;
        let mut state = simplify::direct_sum(&self.weights, &self.states);
        state.strategy = self.strategy;
        Ok(state)
    }
}

impl<A> fmt::Display for MPSSum<A>
where A: ComplexScalar
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPSSum(terms={}, sites={}, error={:e})",
            self.len(), self.size(), self.error())
    }
}

macro_rules! impl_sum_op {
    ( $trait:ident, $method:ident, $sign:expr, $lhs:ty, $rhs:ty ) => {
        impl<A> $trait<$rhs> for $lhs
        where A: ComplexScalar
        {
            type Output = MPSResult<MPSSum<A>>;

            fn $method(self, rhs: $rhs) -> Self::Output {
                MPSSum::from(self).append(MPSSum::from(rhs), $sign)
            }
        }
    }
}
impl_sum_op!(Add, add, A::one(), MPS<A>, MPS<A>);
impl_sum_op!(Add, add, A::one(), &MPS<A>, &MPS<A>);
impl_sum_op!(Add, add, A::one(), MPS<A>, MPSSum<A>);
impl_sum_op!(Add, add, A::one(), MPSSum<A>, MPS<A>);
impl_sum_op!(Add, add, A::one(), MPSSum<A>, MPSSum<A>);
impl_sum_op!(Sub, sub, -A::one(), MPS<A>, MPS<A>);
impl_sum_op!(Sub, sub, -A::one(), &MPS<A>, &MPS<A>);
impl_sum_op!(Sub, sub, -A::one(), MPS<A>, MPSSum<A>);
impl_sum_op!(Sub, sub, -A::one(), MPSSum<A>, MPS<A>);
impl_sum_op!(Sub, sub, -A::one(), MPSSum<A>, MPSSum<A>);

impl<A> Mul<A> for MPSSum<A>
where A: ComplexScalar
{
    type Output = MPSSum<A>;

    fn mul(self, c: A) -> Self::Output { self.scale(c) }
}

impl<A> Neg for MPSSum<A>
where A: ComplexScalar
{
    type Output = MPSSum<A>;

    fn neg(self) -> Self::Output { self.scale(-A::one()) }
}

impl<A> Mul<MPSSum<A>> for f64
where A: ComplexScalar
{
    type Output = MPSSum<A>;

    fn mul(self, sum: MPSSum<A>) -> Self::Output { sum.scale(A::from_re(self)) }
}

impl Mul<MPSSum<C64>> for C64 {
    type Output = MPSSum<C64>;

    fn mul(self, sum: MPSSum<C64>) -> Self::Output { sum.scale(self) }
}

/// A value taking part in state arithmetic whose kind is only known at
/// runtime.
///
/// Every operator matches exhaustively on both operand kinds; pairs with no
/// meaning fail with [`MPSError::UnsupportedOperation`].
#[derive(Clone, Debug)]
pub enum Operand<A> {
    Scalar(A),
    State(MPS<A>),
    Sum(MPSSum<A>),
}

impl<A> From<MPS<A>> for Operand<A> {
    fn from(state: MPS<A>) -> Self { Self::State(state) }
}

impl<A> From<MPSSum<A>> for Operand<A> {
    fn from(sum: MPSSum<A>) -> Self { Self::Sum(sum) }
}

impl<A> Operand<A>
where A: ComplexScalar
{
    /// Return the name of the operand's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "Scalar",
            Self::State(_) => "MPS",
            Self::Sum(_) => "MPSSum",
        }
    }

    fn unsupported(op: &'static str, lhs: &Self, rhs: &Self) -> MPSError {
        MPSError::UnsupportedOperation { op, lhs: lhs.kind(), rhs: rhs.kind() }
    }

    fn into_sum(self) -> Option<MPSSum<A>> {
        match self {
            Self::Scalar(_) => None,
            Self::State(psi) => Some(psi.into()),
            Self::Sum(sum) => Some(sum),
        }
    }

    fn combine(self, rhs: Self, op: &'static str, sign: A) -> MPSResult<Self> {
        match (self, rhs) {
            (Self::Scalar(a), Self::Scalar(b)) => Ok(Self::Scalar(a + sign * b)),
            (lhs @ Self::Scalar(_), rhs) | (lhs, rhs @ Self::Scalar(_)) => {
                Err(Self::unsupported(op, &lhs, &rhs))
            },
            (lhs, rhs) => {
                let (Some(l), Some(r)) = (lhs.into_sum(), rhs.into_sum())
                    else { unreachable!() };
                l.append(r, sign).map(Self::Sum)
            },
        }
    }

    /// Add two operands.
    ///
    /// States and sums combine into a sum; scalars add to scalars. Mixing a
    /// scalar with a state or sum is unsupported.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: Self) -> MPSResult<Self> {
        self.combine(rhs, "+", A::one())
    }

    /// Subtract two operands. See [`Self::add`].
    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: Self) -> MPSResult<Self> {
        self.combine(rhs, "-", -A::one())
    }

    /// Multiply two operands.
    ///
    /// Scalars scale states and sums from either side. Products of two states
    /// or sums are unsupported.
    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, rhs: Self) -> MPSResult<Self> {
        match (self, rhs) {
            (Self::Scalar(a), Self::Scalar(b)) => Ok(Self::Scalar(a * b)),
            (Self::Scalar(c), Self::State(psi))
                | (Self::State(psi), Self::Scalar(c))
                => Ok(Self::State(psi.scale(c))),
            (Self::Scalar(c), Self::Sum(sum))
                | (Self::Sum(sum), Self::Scalar(c))
                => Ok(Self::Sum(sum.scale(c))),
            (lhs, rhs) => Err(Self::unsupported("*", &lhs, &rhs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::{ linalg::distance, strategy::NO_TRUNCATION };

    fn basis(k: usize, n: usize) -> MPS<f64> {
        let mut v = vec![0.0; 1 << n];
        v[k] = 1.0;
        MPS::from_vector(v, &vec![2; n], NO_TRUNCATION, false).unwrap()
    }

    #[test]
    fn construction_validates() {
        let empty: Vec<MPS<f64>> = Vec::new();
        assert!(matches!(
            MPSSum::new(Vec::<f64>::new(), empty, NO_TRUNCATION),
            Err(MPSError::EmptyCombination)
        ));
        assert!(matches!(
            MPSSum::new([1.0], [basis(0, 2), basis(1, 2)], NO_TRUNCATION),
            Err(MPSError::WeightsMismatch)
        ));
        assert!(matches!(
            MPSSum::new([1.0, 1.0], [basis(0, 2), basis(1, 3)], NO_TRUNCATION),
            Err(MPSError::SiteCountMismatch)
        ));
        assert!(matches!(basis(0, 2) + basis(0, 3), Err(MPSError::SiteCountMismatch)));
    }

    #[test]
    fn arithmetic_flattens() {
        let a = basis(0, 2);
        let b = basis(3, 2);
        let s = (a.clone() - b.clone()).unwrap();
        assert_eq!(s.weights(), &[1.0, -1.0]);
        let t = (s.clone() - (a.clone() + b.clone()).unwrap()).unwrap();
        assert_eq!(t.weights(), &[1.0, -1.0, -1.0, -1.0]);
        let u = (2.0 * t).scale(0.5);
        assert_eq!(u.len(), 4);
        let v = u.to_vector().unwrap();
        assert_abs_diff_eq!(
            distance(&v, &nd::array![0.0, 0.0, 0.0, -2.0]), 0.0, epsilon = 1e-12);
        let w = (b + s).unwrap();
        assert_eq!(w.weights(), &[1.0, 1.0, -1.0]);
    }

    #[test]
    fn states_are_shared() {
        let s = (basis(0, 2) + basis(1, 2)).unwrap();
        let t = (s.clone() + s.clone()).unwrap();
        assert!(Arc::ptr_eq(&t.states()[0], &t.states()[2]));
    }

    #[test]
    fn norm_and_error() {
        let mut a = basis(0, 2);
        a.update_error(0.04);
        let mut b = basis(1, 2);
        b.update_error(0.01);
        let s = MPSSum::new([3.0, -4.0], [a, b], NO_TRUNCATION).unwrap();
        assert_abs_diff_eq!(s.norm_squared().unwrap(), 25.0, epsilon = 1e-12);
        // (3 * 0.2 + 4 * 0.1)^2
        assert_abs_diff_eq!(s.error(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn physical_dimensions_checked_on_evaluation() {
        let a = basis(0, 1);
        let b: MPS<f64>
            = MPS::from_vector([1.0, 0.0, 0.0], &[3], NO_TRUNCATION, false).unwrap();
        let s = (a + b).unwrap();
        assert!(matches!(s.to_vector(), Err(MPSError::PhysicalDimensionMismatch)));
        assert!(matches!(s.join(), Err(MPSError::PhysicalDimensionMismatch)));
    }

    #[test]
    fn operands() {
        let a = Operand::from(basis(0, 1));
        let b = Operand::from(basis(1, 1));
        let Ok(Operand::Sum(s)) = a.clone().add(b.clone()) else { panic!() };
        assert_eq!(s.weights(), &[1.0, 1.0]);
        let Ok(Operand::State(psi)) = Operand::Scalar(2.0).mul(a.clone())
            else { panic!() };
        assert_eq!(psi.to_vector().to_vec(), vec![2.0, 0.0]);
        let Ok(Operand::Scalar(x)) = Operand::Scalar(2.0).sub(Operand::Scalar(0.5))
            else { panic!() };
        assert_eq!(x, 1.5);

        let err = Operand::Scalar(1.0).add(b.clone()).unwrap_err();
        assert_eq!(
            err,
            MPSError::UnsupportedOperation { op: "+", lhs: "Scalar", rhs: "MPS" },
        );
        assert_eq!(err.to_string(), "unsupported operation: Scalar + MPS");
        let err = a.mul(Operand::Sum(s)).unwrap_err();
        assert_eq!(
            err,
            MPSError::UnsupportedOperation { op: "*", lhs: "MPS", rhs: "MPSSum" },
        );
    }
}
