//! Truncation and simplification policies.
//!
//! A [`Strategy`] is a small, immutable value that travels with every state and
//! tells the algorithms in this crate how aggressively to discard information:
//! which singular values survive a decomposition, how large bonds may grow, and
//! how the combination engine should iterate. Strategies are `Copy` and can be
//! shared freely between threads.
//!
//! ```
//! use mps_engine::{ Strategy, Truncation };
//!
//! let strategy = Strategy::default()
//!     .with_truncation(Truncation::AbsoluteSingularValue)
//!     .with_tolerance(1e-8)
//!     .with_max_bond_dimension(32);
//! assert!(strategy.truncates());
//! ```

use std::fmt;
#[cfg(feature = "serde")]
use serde::{ Deserialize, Serialize };

/// Default tolerance for both truncation and simplification.
pub const DEFAULT_TOLERANCE: f64 = f64::EPSILON;

/// Largest bond dimension a strategy will ever ask for. Setting
/// [`Strategy::max_bond_dimension`] to this value disables the cap.
pub const MAX_BOND_DIMENSION: usize = 0x7fff_ffff;

/// How singular values are filtered after a decomposition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Truncation {
    /// Keep every singular value (subject only to the bond dimension cap).
    DoNotTruncate,
    /// Keep singular values `s` with `s > tolerance`.
    AbsoluteSingularValue,
    /// Keep singular values `s` with `s > tolerance * s_max`.
    RelativeSingularValue,
    /// Keep the smallest number of leading singular values such that the
    /// discarded squared weight is at most `tolerance` times the total squared
    /// weight.
    RelativeNormSquaredError,
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoNotTruncate => write!(f, "DoNotTruncate"),
            Self::AbsoluteSingularValue => write!(f, "AbsoluteSingularValue"),
            Self::RelativeSingularValue => write!(f, "RelativeSingularValue"),
            Self::RelativeNormSquaredError
                => write!(f, "RelativeNormSquaredError"),
        }
    }
}

/// How a linear combination of states is compressed into a single state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Simplification {
    /// Build the exact direct sum; bond dimensions add up.
    DoNotSimplify,
    /// Build the direct sum and bring it to truncated canonical form once.
    CanonicalForm,
    /// Build an initial guess and refine it with two-site variational sweeps.
    Variational,
}

impl fmt::Display for Simplification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoNotSimplify => write!(f, "DoNotSimplify"),
            Self::CanonicalForm => write!(f, "CanonicalForm"),
            Self::Variational => write!(f, "Variational"),
        }
    }
}

/// Truncation policy for decompositions and combinations.
///
/// All fields are public; the `with_*` methods return modified copies for
/// builder-style construction.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Strategy {
    /// Singular value filter.
    pub truncation: Truncation,
    /// Threshold used by [`Self::truncation`].
    pub tolerance: f64,
    /// Hard cap on bond dimensions, applied after the tolerance filter.
    pub max_bond_dimension: usize,
    /// Combination mode.
    pub simplification: Simplification,
    /// Convergence threshold for variational sweeps.
    pub simplification_tolerance: f64,
    /// Upper limit on the number of variational sweeps.
    pub max_sweeps: usize,
    /// Rescale combination results to unit norm.
    pub normalize: bool,
}

/// The default strategy: relative squared-norm truncation at machine
/// precision, no bond dimension cap, variational simplification.
pub const DEFAULT_STRATEGY: Strategy = Strategy {
    truncation: Truncation::RelativeNormSquaredError,
    tolerance: DEFAULT_TOLERANCE,
    max_bond_dimension: MAX_BOND_DIMENSION,
    simplification: Simplification::Variational,
    simplification_tolerance: DEFAULT_TOLERANCE,
    max_sweeps: 16,
    normalize: false,
};

/// A strategy that never discards anything: no truncation, no cap, and exact
/// direct sums for combinations.
pub const NO_TRUNCATION: Strategy = Strategy {
    truncation: Truncation::DoNotTruncate,
    simplification: Simplification::DoNotSimplify,
    ..DEFAULT_STRATEGY
};

impl Default for Strategy {
    fn default() -> Self { DEFAULT_STRATEGY }
}

impl Strategy {
    /// Return a copy with a different truncation mode.
    pub fn with_truncation(self, truncation: Truncation) -> Self {
        Self { truncation, ..self }
    }

    /// Return a copy with a different truncation threshold.
    ///
    /// The absolute value of `tolerance` is used.
    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance: tolerance.abs(), ..self }
    }

    /// Return a copy with a different bond dimension cap.
    ///
    /// The cap is clamped to the range `1..=MAX_BOND_DIMENSION`.
    pub fn with_max_bond_dimension(self, max_bond_dimension: usize) -> Self {
        Self {
            max_bond_dimension: max_bond_dimension.clamp(1, MAX_BOND_DIMENSION),
            ..self
        }
    }

    /// Return a copy with a different combination mode.
    pub fn with_simplification(self, simplification: Simplification) -> Self {
        Self { simplification, ..self }
    }

    /// Return a copy with a different sweep convergence threshold.
    ///
    /// The absolute value of `tolerance` is used.
    pub fn with_simplification_tolerance(self, tolerance: f64) -> Self {
        Self { simplification_tolerance: tolerance.abs(), ..self }
    }

    /// Return a copy with a different sweep limit (at least 1).
    pub fn with_max_sweeps(self, max_sweeps: usize) -> Self {
        Self { max_sweeps: max_sweeps.max(1), ..self }
    }

    /// Return a copy with normalization switched on or off.
    pub fn with_normalization(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Return `true` if decompositions under this strategy may discard
    /// singular values, either through the tolerance filter or the cap.
    pub fn truncates(&self) -> bool {
        self.truncation != Truncation::DoNotTruncate
            || self.max_bond_dimension < MAX_BOND_DIMENSION
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Strategy(truncation={}, tolerance={:e}, max_bond_dimension={}, \
            simplification={}, simplification_tolerance={:e}, max_sweeps={}, \
            normalize={})",
            self.truncation,
            self.tolerance,
            self.max_bond_dimension,
            self.simplification,
            self.simplification_tolerance,
            self.max_sweeps,
            self.normalize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Strategy::default();
        assert_eq!(s, DEFAULT_STRATEGY);
        assert_eq!(s.truncation, Truncation::RelativeNormSquaredError);
        assert_eq!(s.max_bond_dimension, MAX_BOND_DIMENSION);
        assert_eq!(s.simplification, Simplification::Variational);
        assert!(!s.normalize);
        assert!(s.truncates());
        assert!(!NO_TRUNCATION.truncates());
        assert_eq!(NO_TRUNCATION.simplification, Simplification::DoNotSimplify);
    }

    #[test]
    fn builders_return_modified_copies() {
        let base = NO_TRUNCATION;
        let capped = base.with_max_bond_dimension(0);
        assert_eq!(capped.max_bond_dimension, 1);
        assert!(capped.truncates());
        assert!(!base.truncates());
        let s = base
            .with_tolerance(-1e-6)
            .with_max_sweeps(0)
            .with_normalization(true);
        assert_eq!(s.tolerance, 1e-6);
        assert_eq!(s.max_sweeps, 1);
        assert!(s.normalize);
    }

    #[test]
    fn display_names_every_field() {
        let text = DEFAULT_STRATEGY.to_string();
        assert!(text.contains("RelativeNormSquaredError"));
        assert!(text.contains("Variational"));
        assert!(text.contains("max_sweeps=16"));
    }
}
