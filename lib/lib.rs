//! Matrix product states with controlled truncation.
//!
//! A quantum state of *n* particles is stored as a chain of rank-3 tensors
//! `A[α, i, β]`, where `i` is the physical index of a particle and `α`, `β` are
//! "bond" indices shared with the left and right neighbors. The size of the
//! bond indices sets how much entanglement the state can carry, and hence how
//! much memory it needs.
//!
//! ```text
//!      bond 0       bond 1             bond n-2
//!  A[0] ------ A[1] ------ ... ------ A[n-1]
//!   |           |                      |
//!   | <- physical index 0              | <- physical index n-1
//! ```
//!
//! Beyond the containers themselves ([`MPS`], [`MPSSum`], [`CanonicalMPS`]),
//! this crate provides the machinery that keeps bond dimensions in check: a
//! truncation policy ([`Strategy`]), orthogonalization sweeps that bring a
//! state into canonical form, and a variational engine ([`combine`]) that
//! compresses a weighted sum of states into a single state with bounded bond
//! dimension. Every approximation is accounted for in a running error bound
//! carried by each state.
//!
//! # Example
//!
//! ```
//! use mps_engine::*;
//!
//! let up: MPS<f64> = MPS::from_vector([1.0, 0.0], &[2], NO_TRUNCATION, false)
//!     .unwrap();
//! let down: MPS<f64> = MPS::from_vector([0.0, 1.0], &[2], NO_TRUNCATION, false)
//!     .unwrap();
//!
//! // addition is deferred: nothing is contracted here
//! let sum = (up + down).unwrap();
//!
//! // materialize the sum, normalizing the result
//! let psi = sum.to_mps(Some(true), None).unwrap();
//! let v = psi.to_vector();
//! assert!((v[0] - 0.5_f64.sqrt()).abs() < 1e-12);
//! assert!((v[1] - 0.5_f64.sqrt()).abs() < 1e-12);
//! ```

use nalgebra as na;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::Rng;

pub(crate) mod linalg;

pub mod chain;
pub mod strategy;
pub mod truncate;
pub mod environment;
pub mod mps;
pub mod mpssum;
pub mod canonical;
pub mod simplify;
pub mod factories;
pub mod pool;

pub use chain::{ ChainError, MatrixProduct, TensorChain };
pub use strategy::{
    DEFAULT_STRATEGY,
    DEFAULT_TOLERANCE,
    MAX_BOND_DIMENSION,
    NO_TRUNCATION,
    Simplification,
    Strategy,
    Truncation,
};
pub use mps::{ MPS, MPSError, MPSResult };
pub use mpssum::{ MPSSum, Operand };
pub use canonical::CanonicalMPS;
pub use simplify::{ Combined, InitialGuess, combine, simplify };
pub use environment::scprod;
pub use pool::{ CombinePool, PoolError, PoolResult };

/// Convenience trait to identify the scalar types that can be stored in a
/// state and used in linear-algebraic operations.
///
/// All real-valued quantities derived from states (norms, singular values,
/// errors, tolerances) are `f64`, so this is implemented for the two double
/// precision types, `f64` and [`Complex64`][C64].
pub trait ComplexScalar
where Self: na::ComplexField<RealField = f64> + nd::ScalarOperand + Copy
{
    /// Convert from a real number.
    ///
    /// The result has imaginary part equal to zero.
    fn from_re(x: f64) -> Self { <Self as na::ComplexField>::from_real(x) }

    /// Draw a random value with each component uniform over `[-1, 1)`.
    fn sample<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized;
}

impl ComplexScalar for f64 {
    fn sample<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized
    {
        rng.gen_range(-1.0..1.0)
    }
}

impl ComplexScalar for C64 {
    fn sample<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized
    {
        C64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    }
}
