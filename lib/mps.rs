//! Matrix product states with a running error bound.
//!
//! An [`MPS`] is a validated [`TensorChain`] together with the [`Strategy`] used
//! to create it and an upper bound on the squared norm-2 distance between the
//! stored state and the exact state it approximates. Every lossy operation
//! merges its discarded weight into that bound with the triangle rule
//! ```text
//! error' = (√error + √δ)²
//! ```
//! so the bound only ever grows.
//!
//! States have value semantics: transformations return new states and leave
//! their inputs untouched. Addition and subtraction never contract tensors;
//! they build an [`MPSSum`][crate::mpssum::MPSSum] that is materialized later
//! by the combination engine in [`simplify`][crate::simplify].
//!
//! # Example
//!
//! ```
//! use mps_engine::*;
//!
//! let psi: MPS<f64> = MPS::from_vector(
//!     [0.5, 0.5, 0.5, 0.5],
//!     &[2, 2],
//!     Strategy::default(),
//!     false,
//! ).unwrap();
//! assert_eq!(psi.size(), 2);
//! assert!((psi.norm_squared() - 1.0).abs() < 1e-12);
//!
//! // product state: a single Schmidt value across the cut
//! assert_eq!(psi.bond_dimensions(), vec![1, 1, 1]);
//!
//! let phi = psi.clone() * 2.0;
//! assert!((phi.norm_squared() - 4.0).abs() < 1e-12);
//! ```

use std::{ fmt, ops::{ Mul, Neg } };
use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    ComplexScalar,
    chain::{ ChainError, MatrixProduct, TensorChain },
    environment::{
        all_expectation1,
        expectation1,
        expectation2,
        left_environment_chain,
        right_environment_chain,
    },
    linalg::{ reshape_matrix, split_left },
    simplify,
    strategy::Strategy,
    truncate::{ Schmidt, SchmidtDecomp, combine_errors },
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MPSError {
    /// Returned when a list of tensors fails validation.
    #[error("error in MPS creation: {0}")]
    Chain(#[from] ChainError),

    /// Returned when attempting to create a new MPS for a state of less than 1
    /// particle.
    #[error("error in MPS creation: cannot create for an empty system")]
    EmptySystem,

    /// Returned when attempting to create a new MPS for a state with a zero-
    /// dimensional physical index.
    #[error("error in MPS creation: cannot create for unphysical quantum numbers")]
    UnphysicalIndex,

    /// Returned when attempting to create a new MPS from data with a length
    /// that doesn't match the provided physical dimensions.
    #[error("error in MPS creation: expected data of length {expected}, got {got}")]
    StateIncompatibleShape { expected: usize, got: usize },

    /// Returned when normalization is requested for a zero vector.
    #[error("error in MPS creation: cannot normalize a zero vector")]
    ZeroNorm,

    /// Returned when attempting to apply an operator to an MPS with a matrix
    /// whose dimensions do not agree with relevant physical indice(s).
    #[error("error in operator application: incorrect shape")]
    OperatorIncompatibleShape,

    /// Returned when a site index is past the end of the chain.
    #[error("error in site access: site index out of bounds")]
    SiteOutOfBounds,

    /// Returned when two states in a combination or product have different
    /// numbers of sites.
    #[error("error in combination: states have different numbers of sites")]
    SiteCountMismatch,

    /// Returned when two states in a combination or product have different
    /// physical dimensions on some site.
    #[error("error in combination: states have different physical dimensions")]
    PhysicalDimensionMismatch,

    /// Returned when the number of weights differs from the number of states.
    #[error("error in combination: number of weights does not match number of states")]
    WeightsMismatch,

    /// Returned when attempting to combine zero states.
    #[error("error in combination: cannot combine an empty list of states")]
    EmptyCombination,

    /// Returned when an arithmetic operator is applied to operands it is not
    /// defined for.
    #[error("unsupported operation: {lhs} {op} {rhs}")]
    UnsupportedOperation {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    /// Returned when attempting to extend a state to fewer sites than it has.
    #[error("error in MPS extension: new length is shorter than the state")]
    ExtendTooShort,

    /// Returned when the site positions given for an extension are not
    /// strictly increasing, out of range, or not one per existing site.
    #[error("error in MPS extension: invalid site positions")]
    InvalidSitePositions,

    /// Returned when an orthogonality center is placed past the end of the
    /// chain.
    #[error("error in canonical form: center out of range")]
    CenterOutOfRange,
}
use MPSError::*;
pub type MPSResult<T> = Result<T, MPSError>;

/// A matrix product (pure) state.
///
/// Tensors are stored in an open chain,
/// ```text
///      bond 0       bond 1             bond n-2
///  A[0] ------ A[1] ------ ... ------ A[n-1]
///   |           |                      |
///   | <- physical index 0              | <- physical index n-1
/// ```
/// and no particular gauge is assumed. See
/// [`CanonicalMPS`][crate::canonical::CanonicalMPS] for states with a known
/// orthogonality center.
#[derive(Clone, Debug, PartialEq)]
pub struct MPS<A> {
    pub(crate) chain: TensorChain<A>,
    // Upper bound on the squared norm-2 distance to the exact state; ≥ 0.
    pub(crate) error: f64,
    pub(crate) strategy: Strategy,
}

impl<A> MatrixProduct<A> for MPS<A>
where A: ComplexScalar
{
    fn chain(&self) -> &TensorChain<A> { &self.chain }

    fn error(&self) -> f64 { self.error }
}

impl<A> MPS<A>
where A: ComplexScalar
{
    /// Create a new state from a list of site tensors.
    ///
    /// Fails if the tensors do not form a valid chain. Negative errors are
    /// clamped to zero.
    pub fn new<I>(tensors: I, error: f64, strategy: Strategy) -> MPSResult<Self>
    where I: IntoIterator<Item = nd::Array3<A>>
    {
        let chain = TensorChain::new(tensors)?;
        Ok(Self::from_chain(chain, error, strategy))
    }

    /// Create a new state from an already validated chain.
    pub fn from_chain(chain: TensorChain<A>, error: f64, strategy: Strategy)
        -> Self
    {
        Self { chain, error: error.max(0.0), strategy }
    }

    // sequential SVDs from left to right; the state is left in left-canonical
    // form and the returned weight is the total discarded squared norm
    fn factorize(
        dims: &[usize],
        state: nd::Array1<A>,
        strategy: &Strategy,
    ) -> (Vec<nd::Array3<A>>, f64)
    {
        let n = dims.len(); // assume n ≥ 1
        let mut data: Vec<nd::Array3<A>> = Vec::with_capacity(n);
        let mut discarded: f64 = 0.0;
        let mut udim: usize = 1;
        let statelen = state.len();
        let mut q: nd::Array2<A>
            = nd::Array2::from_shape_fn((1, statelen), |(_, k)| state[k]);
        for &d in dims.iter().take(n - 1) {
            // fuse the physical index with the previous Schmidt index
            let rows = udim * d;
            let cols = q.len() / rows;
            q = reshape_matrix(&q, rows, cols);

            // left vectors become the site tensor; Schmidt values and right
            // vectors carry over to the rest of the state
            let schmidt: Schmidt<A> = q.local_decomp(strategy);
            data.push(split_left(&schmidt.u, udim, d));
            q = schmidt.svt();
            discarded += schmidt.discarded;
            udim = schmidt.rank;
        }
        let d = dims[n - 1];
        data.push(nd::Array3::from_shape_fn((udim, d, 1), |(u, s, _)| q[[u, s]]));
        (data, discarded)
    }

    /// Initialize by factoring an existing pure state vector.
    ///
    /// The vector is ordered with the physical index of site 0 varying slowest.
    /// Singular values at each cut are filtered according to `strategy`, and
    /// the total discarded squared weight becomes the state's error. If
    /// `normalize` is `true`, the vector is divided by its norm first.
    ///
    /// Fails if no dimensions are given, any dimension is zero, the vector does
    /// not have length Π<sub>*k*</sub> *d*<sub>*k*</sub>, or normalization is
    /// requested for a zero vector.
    pub fn from_vector<J>(
        state: J,
        dimensions: &[usize],
        strategy: Strategy,
        normalize: bool,
    ) -> MPSResult<Self>
    where J: IntoIterator<Item = A>
    {
        if dimensions.is_empty() { return Err(EmptySystem); }
        if dimensions.iter().any(|d| *d == 0) { return Err(UnphysicalIndex); }
        let expected: usize
            = dimensions.iter()
            .try_fold(1_usize, |acc, d| acc.checked_mul(*d))
            .unwrap_or(usize::MAX);
        let mut state: nd::Array1<A> = state.into_iter().collect();
        if state.len() != expected {
            return Err(StateIncompatibleShape { expected, got: state.len() });
        }
        if normalize {
            let norm: f64
                = state.iter().map(|a| a.modulus_squared()).sum::<f64>().sqrt();
            if norm == 0.0 { return Err(ZeroNorm); }
            state.mapv_inplace(|a| a.unscale(norm));
        }
        let (data, discarded) = Self::factorize(dimensions, state, &strategy);
        let chain = TensorChain::from_vec_unchecked(data);
        Ok(Self::from_chain(chain, discarded, strategy))
    }

    /// Return the strategy attached to this state.
    pub fn strategy(&self) -> Strategy { self.strategy }

    /// Return a copy with a different attached strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Unwrap into the underlying chain.
    pub fn into_chain(self) -> TensorChain<A> { self.chain }

    /// Merge a newly incurred approximation error into the running bound and
    /// return the new bound.
    pub fn update_error(&mut self, delta: f64) -> f64 {
        self.error = combine_errors(self.error, delta);
        self.error
    }

    /// Multiply the state by a scalar.
    ///
    /// Only the first tensor is touched; the error is scaled by `|c|²`.
    pub fn scale(mut self, c: A) -> Self {
        self.chain.data[0].mapv_inplace(|a| a * c);
        self.error *= c.modulus_squared();
        self
    }

    /// Return the complex conjugate of the state.
    pub fn conj(&self) -> Self {
        let data: Vec<nd::Array3<A>>
            = self.chain.iter()
            .map(|a| a.mapv(|x| x.conjugate()))
            .collect();
        Self {
            chain: TensorChain::from_vec_unchecked(data),
            error: self.error,
            strategy: self.strategy,
        }
    }

    /// Embed the state into a longer chain.
    ///
    /// The existing tensors are placed at positions `sites` (default: the first
    /// `size()` positions) of a chain with `new_length` sites, and every other
    /// position receives a copy tensor that passes its bond through and fixes
    /// the new physical index to its first value. `dimensions` gives the
    /// physical dimension of the new sites, either as a single value for all of
    /// them or as one value per position of the new chain.
    ///
    /// Fails if `new_length < size()`, if `sites` is not a strictly increasing
    /// list of `size()` positions below `new_length`, or if `dimensions` has
    /// the wrong length or contains a zero.
    pub fn extend(
        &self,
        new_length: usize,
        sites: Option<&[usize]>,
        dimensions: &[usize],
    ) -> MPSResult<Self>
    {
        let n = self.size();
        if new_length < n { return Err(ExtendTooShort); }
        let default_sites: Vec<usize> = (0..n).collect();
        let sites: &[usize] = sites.unwrap_or(&default_sites);
        if sites.len() != n
            || sites.windows(2).any(|w| w[0] >= w[1])
            || sites.last().is_some_and(|last| *last >= new_length)
        {
            return Err(InvalidSitePositions);
        }
        if dimensions.len() != 1 && dimensions.len() != new_length {
            return Err(StateIncompatibleShape {
                expected: new_length,
                got: dimensions.len(),
            });
        }
        if dimensions.iter().any(|d| *d == 0) { return Err(UnphysicalIndex); }

        let mut slots: Vec<Option<&nd::Array3<A>>> = vec![None; new_length];
        sites.iter().zip(self.chain.iter())
            .for_each(|(k, a)| { slots[*k] = Some(a); });
        let mut bond: usize = 1;
        let data: Vec<nd::Array3<A>>
            = slots.into_iter().enumerate()
            .map(|(k, slot)| {
                if let Some(a) = slot {
                    bond = a.dim().2;
                    a.clone()
                } else {
                    let d = if dimensions.len() == 1 { dimensions[0] } else { dimensions[k] };
                    copy_tensor(bond, d)
                }
            })
            .collect();
        Ok(Self {
            chain: TensorChain::from_vec_unchecked(data),
            error: self.error,
            strategy: self.strategy,
        })
    }

    /// Return the norm environment of all sites strictly left of `site`.
    pub fn left_environment(&self, site: usize) -> MPSResult<nd::Array2<A>> {
        if site >= self.size() { return Err(SiteOutOfBounds); }
        Ok(left_environment_chain(&self.chain, site))
    }

    /// Return the norm environment of all sites strictly right of `site`.
    pub fn right_environment(&self, site: usize) -> MPSResult<nd::Array2<A>> {
        if site >= self.size() { return Err(SiteOutOfBounds); }
        Ok(right_environment_chain(&self.chain, site))
    }

    /// Compute `⟨ψ|O|ψ⟩` for a single-site operator.
    ///
    /// See [`expectation1`][crate::environment::expectation1].
    pub fn expectation1(&self, op: &nd::Array2<A>, site: usize) -> MPSResult<A> {
        expectation1(self, op, site)
    }

    /// Compute `⟨ψ|O|ψ⟩` for a single-site operator on every site.
    pub fn all_expectation1(&self, op: &nd::Array2<A>)
        -> MPSResult<nd::Array1<A>>
    {
        all_expectation1(self, op)
    }

    /// Compute `⟨ψ|O₁ O₂|ψ⟩` for operators on sites `i` and `j`.
    pub fn expectation2(
        &self,
        op1: &nd::Array2<A>,
        i: usize,
        op2: &nd::Array2<A>,
        j: usize,
    ) -> MPSResult<A>
    {
        expectation2(self, op1, i, op2, j)
    }

    /// Compress the state with the combination engine.
    ///
    /// Uses `strategy`, or the state's own strategy if `None`. The returned
    /// state carries both the old error and the compression error.
    pub fn simplify(&self, strategy: Option<Strategy>) -> MPSResult<Self> {
        let strategy = strategy.unwrap_or(self.strategy);
        simplify::simplify(self, &strategy).map(|combined| combined.state)
    }
}

// identity on the bond, first basis state on the physical index
fn copy_tensor<A>(bond: usize, d: usize) -> nd::Array3<A>
where A: ComplexScalar
{
    nd::Array3::from_shape_fn((bond, d, bond), |(u, s, v)| {
        if s == 0 && u == v { A::one() } else { A::zero() }
    })
}

impl<A> fmt::Display for MPS<A>
where A: ComplexScalar
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MPS(sites={}, physical={:?}, bonds={:?}, error={:e})",
            self.size(),
            self.physical_dimensions(),
            self.bond_dimensions(),
            self.error,
        )
    }
}

impl<A> Mul<A> for MPS<A>
where A: ComplexScalar
{
    type Output = MPS<A>;

    fn mul(self, c: A) -> Self::Output { self.scale(c) }
}

impl<A> Mul<A> for &MPS<A>
where A: ComplexScalar
{
    type Output = MPS<A>;

    fn mul(self, c: A) -> Self::Output { self.clone().scale(c) }
}

impl<A> Neg for MPS<A>
where A: ComplexScalar
{
    type Output = MPS<A>;

    fn neg(self) -> Self::Output { self.scale(-A::one()) }
}

impl<A> Mul<MPS<A>> for f64
where A: ComplexScalar
{
    type Output = MPS<A>;

    fn mul(self, state: MPS<A>) -> Self::Output { state.scale(A::from_re(self)) }
}

impl<A> Mul<&MPS<A>> for f64
where A: ComplexScalar
{
    type Output = MPS<A>;

    fn mul(self, state: &MPS<A>) -> Self::Output {
        state.clone().scale(A::from_re(self))
    }
}

impl Mul<MPS<C64>> for C64 {
    type Output = MPS<C64>;

    fn mul(self, state: MPS<C64>) -> Self::Output { state.scale(self) }
}

impl Mul<&MPS<C64>> for C64 {
    type Output = MPS<C64>;

    fn mul(self, state: &MPS<C64>) -> Self::Output { state.clone().scale(self) }
}
