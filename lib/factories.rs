//! Constructors for commonly used states.
//!
//! All states built here are exact, so they carry zero error and the default
//! strategy.

use itertools::Itertools;
use ndarray as nd;
use rand::Rng;
use crate::{
    ComplexScalar,
    chain::TensorChain,
    mps::{ MPS, MPSError, MPSResult },
    strategy::DEFAULT_STRATEGY,
};

fn from_tensors<A>(data: Vec<nd::Array3<A>>) -> MPS<A>
where A: ComplexScalar
{
    MPS::from_chain(TensorChain::from_vec_unchecked(data), 0.0, DEFAULT_STRATEGY)
}

/// Create a product state from one local vector per site.
///
/// Fails if no vectors are given or any of them is empty.
pub fn product_state<A, I, V>(vectors: I) -> MPSResult<MPS<A>>
where
    A: ComplexScalar,
    I: IntoIterator<Item = V>,
    V: IntoIterator<Item = A>,
{
    let data: Vec<nd::Array3<A>>
        = vectors.into_iter()
        .map(|v| {
            let v: Vec<A> = v.into_iter().collect();
            if v.is_empty() { return Err(MPSError::UnphysicalIndex); }
            Ok(nd::Array3::from_shape_fn((1, v.len(), 1), |(_, s, _)| v[s]))
        })
        .collect::<MPSResult<_>>()?;
    if data.is_empty() { return Err(MPSError::EmptySystem); }
    Ok(from_tensors(data))
}

/// Create the `n`-qubit GHZ state (|0...0⟩ + |1...1⟩) / √2.
///
/// Fails if `n == 0`.
pub fn ghz<A>(n: usize) -> MPSResult<MPS<A>>
where A: ComplexScalar
{
    if n == 0 { return Err(MPSError::EmptySystem); }
    let amp = A::from_re(0.5_f64.sqrt());
    if n == 1 {
        return Ok(from_tensors(vec![nd::Array3::from_elem((1, 2, 1), amp)]));
    }
    let first = nd::Array3::from_shape_fn((1, 2, 2), |(_, s, b)| {
        if s == b { amp } else { A::zero() }
    });
    let middle = nd::Array3::from_shape_fn((2, 2, 2), |(a, s, b)| {
        if a == s && s == b { A::one() } else { A::zero() }
    });
    let last = nd::Array3::from_shape_fn((2, 2, 1), |(a, s, _)| {
        if a == s { A::one() } else { A::zero() }
    });
    let mut data = Vec::with_capacity(n);
    data.push(first);
    (1..n - 1).for_each(|_| { data.push(middle.clone()); });
    data.push(last);
    Ok(from_tensors(data))
}

/// Create the `n`-qubit W state, the uniform superposition of all states with
/// exactly one qubit in |1⟩.
///
/// The bond index records whether the excitation has already been placed.
/// Fails if `n == 0`.
pub fn w_state<A>(n: usize) -> MPSResult<MPS<A>>
where A: ComplexScalar
{
    if n == 0 { return Err(MPSError::EmptySystem); }
    if n == 1 {
        let a = nd::Array3::from_shape_fn((1, 2, 1), |(_, s, _)| {
            if s == 1 { A::one() } else { A::zero() }
        });
        return Ok(from_tensors(vec![a]));
    }
    let amp = A::from_re((n as f64).sqrt().recip());
    let first = nd::Array3::from_shape_fn((1, 2, 2), |(_, s, b)| {
        if s == b { amp } else { A::zero() }
    });
    // a + s == b: carry the excitation count, at most one
    let middle = nd::Array3::from_shape_fn((2, 2, 2), |(a, s, b)| {
        if a + s == b { A::one() } else { A::zero() }
    });
    let last = nd::Array3::from_shape_fn((2, 2, 1), |(a, s, _)| {
        if a + s == 1 { A::one() } else { A::zero() }
    });
    let mut data = Vec::with_capacity(n);
    data.push(first);
    (1..n - 1).for_each(|_| { data.push(middle.clone()); });
    data.push(last);
    Ok(from_tensors(data))
}

/// Create a spin wave `Σ_i ψ_i |0...1_i...0⟩`, one excitation spread over the
/// sites with the given amplitudes.
///
/// [`w_state`] is the spin wave with uniform amplitudes. Fails if no
/// amplitudes are given.
pub fn spin_wave<A>(amplitudes: &[A]) -> MPSResult<MPS<A>>
where A: ComplexScalar
{
    let n = amplitudes.len();
    if n == 0 { return Err(MPSError::EmptySystem); }
    if n == 1 {
        let a = nd::Array3::from_shape_fn((1, 2, 1), |(_, s, _)| {
            if s == 1 { amplitudes[0] } else { A::zero() }
        });
        return Ok(from_tensors(vec![a]));
    }
    // a + s == b: carry the excitation count, placing it with amplitude ψ_k
    let site = |k: usize, l: usize, r: usize| {
        nd::Array3::from_shape_fn((l, 2, r), |(a, s, b)| {
            let b = if r == 1 { 1 } else { b };
            match (a, s, b) {
                (0, 0, 0) | (1, 0, 1) => A::one(),
                (0, 1, 1) => amplitudes[k],
                _ => A::zero(),
            }
        })
    };
    let data: Vec<nd::Array3<A>>
        = (0..n)
        .map(|k| {
            let l = if k == 0 { 1 } else { 2 };
            let r = if k == n - 1 { 1 } else { 2 };
            site(k, l, r)
        })
        .collect();
    Ok(from_tensors(data))
}

/// Create the spin-1 AKLT state on `n` sites with open boundaries.
///
/// Every site carries the bond-2 valence-bond tensor with physical basis
/// `(+1, 0, -1)`. The edge spins are fixed by keeping the first row of the
/// first tensor and the last column of the last one, so nonzero `±1` spins
/// alternate starting and ending with `+1`. The state is not normalized.
///
/// Fails if `n == 0`.
pub fn aklt<A>(n: usize) -> MPSResult<MPS<A>>
where A: ComplexScalar
{
    if n == 0 { return Err(MPSError::EmptySystem); }
    let a = A::from_re((2.0_f64 / 3.0).sqrt());
    let b = A::from_re((1.0_f64 / 3.0).sqrt());
    let bulk = nd::Array3::from_shape_fn((2, 3, 2), |idx| {
        match idx {
            (0, 0, 1) => a,
            (0, 1, 0) => -b,
            (1, 1, 1) => b,
            (1, 2, 0) => -a,
            _ => A::zero(),
        }
    });
    let data: Vec<nd::Array3<A>>
        = (0..n)
        .map(|k| {
            let rows = if k == 0 { 0..1 } else { 0..2 };
            let cols = if k == n - 1 { 1..2 } else { 0..2 };
            bulk.slice(nd::s![rows, .., cols]).to_owned()
        })
        .collect();
    Ok(from_tensors(data))
}

/// Create a state with random entries, each component drawn uniformly from
/// `[-1, 1)`.
///
/// Bond `k` has dimension `min(bond_dimension, Π_{j<k} d_j, Π_{j≥k} d_j)`, so
/// bonds near the edges never exceed what the physical dimensions can support.
/// The state is not normalized.
///
/// Fails if no dimensions are given or any of them is zero.
pub fn random_mps<A, R>(dims: &[usize], bond_dimension: usize, rng: &mut R)
    -> MPSResult<MPS<A>>
where
    A: ComplexScalar,
    R: Rng + ?Sized,
{
    if dims.is_empty() { return Err(MPSError::EmptySystem); }
    if dims.iter().any(|d| *d == 0) { return Err(MPSError::UnphysicalIndex); }
    let cap = bond_dimension.max(1);
    let n = dims.len();
    let bonds: Vec<usize>
        = (0..=n)
        .map(|k| {
            let left = dims[..k].iter().fold(1_usize, |acc, d| acc.saturating_mul(*d));
            let right = dims[k..].iter().fold(1_usize, |acc, d| acc.saturating_mul(*d));
            cap.min(left).min(right)
        })
        .collect();
    let data: Vec<nd::Array3<A>>
        = bonds.iter().tuple_windows()
        .zip(dims)
        .map(|((l, r), d)| {
            nd::Array3::from_shape_simple_fn((*l, *d, *r), || A::sample(rng))
        })
        .collect();
    Ok(from_tensors(data))
}
