//! Validated chains of rank-3 site tensors.
//!
//! A [`TensorChain`] is the storage shared by [`MPS`][crate::mps::MPS] and
//! [`CanonicalMPS`][crate::canonical::CanonicalMPS]. Each tensor carries the axis
//! signature
//! ```text
//! [ left bond, physical, right bond ]
//! ```
//! and neighboring tensors must agree on the bond between them. The open ends of
//! the chain have bond dimension 1.

use std::ops::Index;
use ndarray as nd;
use thiserror::Error;
use crate::{
    ComplexScalar,
    environment::scprod_chain,
    linalg::{ fuse_left, reshape_matrix },
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Returned when attempting to build a chain with no tensors.
    #[error("error in chain creation: a chain must have at least one site")]
    EmptyChain,

    /// Returned when a tensor has a zero-sized axis.
    #[error("error in chain creation: tensor at site {site} has a zero-sized axis")]
    ZeroDimension { site: usize },

    /// Returned when an open end of the chain does not have bond dimension 1.
    #[error("error in chain creation: boundary bond at site {site} has dimension {dim}, expected 1")]
    BoundaryBond { site: usize, dim: usize },

    /// Returned when two neighboring tensors disagree on their shared bond.
    #[error("error in chain creation: right bond of site {site} ({right}) does not match left bond of site {} ({left})", .site + 1)]
    BondMismatch { site: usize, right: usize, left: usize },
}
use ChainError::*;
pub type ChainResult<T> = Result<T, ChainError>;

/// An ordered, non-empty sequence of site tensors with consistent bonds.
///
/// Cloning a chain copies every tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorChain<A> {
    // Array `k` has axis signature
    //   [ u{k - 1}, s{k}, u{k} ]
    // with dim(u{-1}) == dim(u{n - 1}) == 1
    pub(crate) data: Vec<nd::Array3<A>>, // length ≥ 1
}

impl<A> TensorChain<A> {
    /// Validate and wrap a list of site tensors.
    ///
    /// Fails if the list is empty, any tensor has a zero-sized axis, either
    /// open end has bond dimension other than 1, or two neighbors disagree on
    /// their shared bond.
    pub fn new<I>(tensors: I) -> ChainResult<Self>
    where I: IntoIterator<Item = nd::Array3<A>>
    {
        let data: Vec<nd::Array3<A>> = tensors.into_iter().collect();
        if data.is_empty() { return Err(EmptyChain); }
        for (site, a) in data.iter().enumerate() {
            if a.is_empty() { return Err(ZeroDimension { site }); }
        }
        let n = data.len();
        let first = data[0].dim().0;
        if first != 1 { return Err(BoundaryBond { site: 0, dim: first }); }
        let last = data[n - 1].dim().2;
        if last != 1 { return Err(BoundaryBond { site: n - 1, dim: last }); }
        for (site, (a, b)) in data.iter().zip(data.iter().skip(1)).enumerate() {
            let right = a.dim().2;
            let left = b.dim().0;
            if right != left {
                return Err(BondMismatch { site, right, left });
            }
        }
        Ok(Self { data })
    }

    // callers guarantee the invariants
    pub(crate) fn from_vec_unchecked(data: Vec<nd::Array3<A>>) -> Self {
        debug_assert!(!data.is_empty());
        Self { data }
    }

    /// Return the number of sites.
    pub fn size(&self) -> usize { self.data.len() }

    /// Return a reference to the tensor at site `k`, if it exists.
    pub fn get(&self, k: usize) -> Option<&nd::Array3<A>> { self.data.get(k) }

    /// Iterate over all site tensors from left to right.
    pub fn iter(&self) -> std::slice::Iter<'_, nd::Array3<A>> {
        self.data.iter()
    }

    /// Unwrap into the underlying list of tensors.
    pub fn into_inner(self) -> Vec<nd::Array3<A>> { self.data }

    /// Return the physical dimension of every site.
    pub fn physical_dimensions(&self) -> Vec<usize> {
        self.data.iter().map(|a| a.dim().1).collect()
    }

    /// Return the dimensions of all bonds, including the two trivial bonds at
    /// the open ends, so the result has length `size() + 1`.
    pub fn bond_dimensions(&self) -> Vec<usize> {
        std::iter::once(self.data[0].dim().0)
            .chain(self.data.iter().map(|a| a.dim().2))
            .collect()
    }

    /// Return the largest bond dimension in the chain.
    pub fn max_bond_dimension(&self) -> usize {
        self.data.iter().map(|a| a.dim().2).max().unwrap_or(1)
    }

    /// Return the dimension of the full Hilbert space, i.e. the product of all
    /// physical dimensions.
    ///
    /// Returns `None` if the product overflows `usize`.
    pub fn dimension(&self) -> Option<usize> {
        self.data.iter()
            .try_fold(1_usize, |acc, a| acc.checked_mul(a.dim().1))
    }
}

impl<A> TensorChain<A>
where A: ComplexScalar
{
    /// Contract the chain into a dense state vector.
    ///
    /// Tensors are absorbed from right to left, and the result is ordered with
    /// the physical index of site 0 varying slowest. This costs memory
    /// exponential in the number of sites.
    pub fn to_vector(&self) -> nd::Array1<A> {
        // running tensor Ψ :: { u, rest }
        let mut psi: nd::Array2<A> = nd::Array2::from_elem((1, 1), A::one());
        for a in self.data.iter().rev() {
            let (l, d, _) = a.dim();
            let q = fuse_left(a).dot(&psi);
            let rest = q.ncols();
            psi = reshape_matrix(&q, l, d * rest);
        }
        psi.row(0).to_owned()
    }
}

impl<A> Index<usize> for TensorChain<A> {
    type Output = nd::Array3<A>;

    fn index(&self, k: usize) -> &Self::Output { &self.data[k] }
}

impl<'a, A> IntoIterator for &'a TensorChain<A> {
    type Item = &'a nd::Array3<A>;
    type IntoIter = std::slice::Iter<'a, nd::Array3<A>>;

    fn into_iter(self) -> Self::IntoIter { self.data.iter() }
}

/// Read-only interface shared by all matrix product representations.
pub trait MatrixProduct<A>
where A: ComplexScalar
{
    /// Return a reference to the underlying tensors.
    fn chain(&self) -> &TensorChain<A>;

    /// Return the running upper bound on the squared norm-2 distance to the
    /// exact state.
    fn error(&self) -> f64;

    /// Return the number of sites.
    fn size(&self) -> usize { self.chain().size() }

    /// Return the physical dimension of every site.
    fn physical_dimensions(&self) -> Vec<usize> {
        self.chain().physical_dimensions()
    }

    /// Return the dimensions of all bonds, including the trivial bonds at the
    /// open ends.
    fn bond_dimensions(&self) -> Vec<usize> { self.chain().bond_dimensions() }

    /// Return the largest bond dimension.
    fn max_bond_dimension(&self) -> usize {
        self.chain().max_bond_dimension()
    }

    /// Return the product of all physical dimensions, or `None` on overflow.
    fn dimension(&self) -> Option<usize> { self.chain().dimension() }

    /// Contract into a dense state vector. See [`TensorChain::to_vector`].
    fn to_vector(&self) -> nd::Array1<A> { self.chain().to_vector() }

    /// Return `|⟨ψ|ψ⟩|`, computed by contracting the chain with its conjugate.
    fn norm_squared(&self) -> f64 {
        scprod_chain(self.chain(), self.chain()).modulus()
    }

    /// Return the norm of the state.
    fn norm(&self) -> f64 { self.norm_squared().sqrt() }
}
