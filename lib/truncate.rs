//! Singular value filtering and error bookkeeping.
//!
//! Every lossy step in this crate goes through [`truncate_svals`]: singular
//! values are sorted in descending order, filtered according to a
//! [`Strategy`], and the squared weight of whatever is thrown away is reported
//! so it can be merged into a state's running error with [`combine_errors`].

use log::trace;
use ndarray as nd;
use crate::{
    ComplexScalar,
    linalg::{ Svd, scale_cols, scale_rows, svd },
    strategy::{ Strategy, Truncation },
};

/// Compose two squared-norm error bounds with the triangle inequality,
/// `(√a + √b)²`.
///
/// Negative inputs are treated as zero. The result is symmetric in its
/// arguments, so a sequence of updates gives the same bound in any order.
pub fn combine_errors(a: f64, b: f64) -> f64 {
    let r = a.max(0.0).sqrt() + b.max(0.0).sqrt();
    r * r
}

/// Decide how many leading singular values to keep.
///
/// `s` must be sorted in descending order. Returns the number of values kept
/// (at least 1 if `s` is non-empty, at most `strategy.max_bond_dimension`) and
/// the sum of the squares of the discarded values. A discarded value is never
/// larger than a retained one.
pub fn truncate_svals(s: &[f64], strategy: &Strategy) -> (usize, f64) {
    let n = s.len();
    if n == 0 { return (0, 0.0); }
    let tol = strategy.tolerance;
    let filtered: usize
        = match strategy.truncation {
            Truncation::DoNotTruncate => n,
            Truncation::AbsoluteSingularValue => {
                s.iter().take_while(|sj| **sj > tol).count()
            },
            Truncation::RelativeSingularValue => {
                let cutoff = tol * s[0];
                s.iter().take_while(|sj| **sj > cutoff).count()
            },
            Truncation::RelativeNormSquaredError => {
                let total: f64 = s.iter().map(|sj| sj * sj).sum();
                let budget = tol * total;
                let mut tail = 0.0;
                let mut k = n;
                while k > 0 && tail + s[k - 1] * s[k - 1] <= budget {
                    tail += s[k - 1] * s[k - 1];
                    k -= 1;
                }
                k
            },
        };
    let rank = filtered.min(strategy.max_bond_dimension).max(1);
    let discarded: f64 = s[rank..].iter().map(|sj| sj * sj).sum();
    (rank, discarded)
}

/// A truncated singular value decomposition `u · diag(s) · vt`.
#[derive(Clone, Debug, PartialEq)]
pub struct Schmidt<A> {
    /// Matrix whose columns are the left Schmidt vectors.
    pub u: nd::Array2<A>,
    /// Retained Schmidt values, in descending order.
    pub s: Vec<f64>,
    /// Matrix whose rows are the right Schmidt vectors.
    pub vt: nd::Array2<A>,
    /// Number of retained values.
    pub rank: usize,
    /// Sum of the squares of the discarded values.
    pub discarded: f64,
}

impl<A> Schmidt<A>
where A: ComplexScalar
{
    /// Return `u · diag(s)`.
    pub fn us(&self) -> nd::Array2<A> { scale_cols(&self.u, &self.s) }

    /// Return `diag(s) · vt`.
    pub fn svt(&self) -> nd::Array2<A> { scale_rows(&self.s, &self.vt) }
}

/// Succinctly names a 2D array that can be factorized via a truncated
/// Schmidt/singular value decomposition.
pub trait SchmidtDecomp<A> {
    /// Return the Schmidt decomposition of `self`, truncated according to
    /// `strategy`.
    fn local_decomp(&self, strategy: &Strategy) -> Schmidt<A>;
}

impl<A> SchmidtDecomp<A> for nd::Array2<A>
where A: ComplexScalar
{
    fn local_decomp(&self, strategy: &Strategy) -> Schmidt<A> {
        let Svd { u, mut s, vt } = svd(self);
        let n = s.len();
        let (rank, discarded) = truncate_svals(&s, strategy);
        s.truncate(rank);
        let u = u.slice(nd::s![.., ..rank]).to_owned();
        let vt = vt.slice(nd::s![..rank, ..]).to_owned();
        if rank < n {
            trace!("truncated {n} -> {rank} singular values (discarded {discarded:e})");
        }
        Schmidt { u, s, vt, rank, discarded }
    }
}
