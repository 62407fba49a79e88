//! Dense kernels shared by the rest of the crate.
//!
//! Site tensors live in `ndarray` arrays, but decompositions are delegated to
//! `nalgebra`. Everything here works on logical (row-major) indices, so none of
//! it depends on the memory layout of its inputs.

use std::cmp::Ordering;
use nalgebra as na;
use ndarray as nd;
use crate::ComplexScalar;

pub(crate) fn to_dmatrix<A>(m: &nd::Array2<A>) -> na::DMatrix<A>
where A: ComplexScalar
{
    let (rows, cols) = m.dim();
    na::DMatrix::from_fn(rows, cols, |i, j| m[[i, j]])
}

pub(crate) fn from_dmatrix<A>(m: &na::DMatrix<A>) -> nd::Array2<A>
where A: ComplexScalar
{
    nd::Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

// fuse the left bond and physical index
//      a :: { u, s, v }
// to
//      m :: { u<>s, v }
pub(crate) fn fuse_left<A: Copy>(a: &nd::Array3<A>) -> nd::Array2<A> {
    let (l, d, r) = a.dim();
    nd::Array2::from_shape_fn((l * d, r), |(us, v)| a[[us / d, us % d, v]])
}

// fuse the physical index and right bond
//      a :: { u, s, v }
// to
//      m :: { u, s<>v }
pub(crate) fn fuse_right<A: Copy>(a: &nd::Array3<A>) -> nd::Array2<A> {
    let (l, d, r) = a.dim();
    nd::Array2::from_shape_fn((l, d * r), |(u, sv)| a[[u, sv / r, sv % r]])
}

// inverse of `fuse_left`, for a left bond of dimension `l` and physical index
// of dimension `d`
pub(crate) fn split_left<A: Copy>(m: &nd::Array2<A>, l: usize, d: usize)
    -> nd::Array3<A>
{
    let r = m.ncols();
    nd::Array3::from_shape_fn((l, d, r), |(u, s, v)| m[[u * d + s, v]])
}

// inverse of `fuse_right`, for a physical index of dimension `d` and right bond
// of dimension `r`
pub(crate) fn split_right<A: Copy>(m: &nd::Array2<A>, d: usize, r: usize)
    -> nd::Array3<A>
{
    let l = m.nrows();
    nd::Array3::from_shape_fn((l, d, r), |(u, s, v)| m[[u, s * r + v]])
}

// row-major reshape of a matrix
pub(crate) fn reshape_matrix<A: Copy>(m: &nd::Array2<A>, rows: usize, cols: usize)
    -> nd::Array2<A>
{
    let c0 = m.ncols();
    nd::Array2::from_shape_fn((rows, cols), |(i, j)| {
        let k = i * cols + j;
        m[[k / c0, k % c0]]
    })
}

pub(crate) fn adjoint<A>(m: &nd::Array2<A>) -> nd::Array2<A>
where A: ComplexScalar
{
    let (rows, cols) = m.dim();
    nd::Array2::from_shape_fn((cols, rows), |(i, j)| m[[j, i]].conjugate())
}

// multiply the `k`-th row of `m` by `s[k]`
pub(crate) fn scale_rows<A>(s: &[f64], m: &nd::Array2<A>) -> nd::Array2<A>
where A: ComplexScalar
{
    nd::Array2::from_shape_fn(m.dim(), |(i, j)| m[[i, j]].scale(s[i]))
}

// multiply the `k`-th column of `m` by `s[k]`
pub(crate) fn scale_cols<A>(m: &nd::Array2<A>, s: &[f64]) -> nd::Array2<A>
where A: ComplexScalar
{
    nd::Array2::from_shape_fn(m.dim(), |(i, j)| m[[i, j]].scale(s[j]))
}

/// Σ conj(a) b over all elements, in logical order.
pub(crate) fn vdot<A, D>(a: &nd::Array<A, D>, b: &nd::Array<A, D>) -> A
where
    A: ComplexScalar,
    D: nd::Dimension,
{
    a.iter().zip(b.iter())
        .fold(A::zero(), |acc, (ak, bk)| acc + ak.conjugate() * *bk)
}

/// Σ |a|² over all elements.
pub(crate) fn norm_sq<A, D>(a: &nd::Array<A, D>) -> f64
where
    A: ComplexScalar,
    D: nd::Dimension,
{
    a.iter().map(|ak| ak.modulus_squared()).sum()
}

/// Singular value decomposition with singular values sorted in descending
/// order.
///
/// Ties are broken by original position, so the result is deterministic.
pub(crate) struct Svd<A> {
    /// Left singular vectors as columns, `m × k`.
    pub u: nd::Array2<A>,
    /// Singular values, length `k`.
    pub s: Vec<f64>,
    /// Right singular vectors as rows, `k × n`.
    pub vt: nd::Array2<A>,
}

pub(crate) fn svd<A>(m: &nd::Array2<A>) -> Svd<A>
where A: ComplexScalar
{
    let (rows, cols) = m.dim();
    let na::SVD { u, v_t, singular_values }
        = to_dmatrix(m).svd(true, true);
    let (Some(u), Some(v_t)) = (u, v_t) else { unreachable!() };
    let k = singular_values.len();
    let mut order: Vec<usize> = (0..k).collect();
    // stable sort: equal values keep their original relative order
    order.sort_by(|&i, &j| {
        singular_values[j].partial_cmp(&singular_values[i])
            .unwrap_or(Ordering::Equal)
    });
    let u = nd::Array2::from_shape_fn((rows, k), |(i, j)| u[(i, order[j])]);
    let vt = nd::Array2::from_shape_fn((k, cols), |(i, j)| v_t[(order[i], j)]);
    let s: Vec<f64> = order.iter().map(|&j| singular_values[j]).collect();
    Svd { u, s, vt }
}

/// Thin QR decomposition: for `m × n` input, `q` is `m × k` with orthonormal
/// columns and `r` is `k × n`, where `k = min(m, n)`.
pub(crate) fn qr<A>(m: &nd::Array2<A>) -> (nd::Array2<A>, nd::Array2<A>)
where A: ComplexScalar
{
    let qr = to_dmatrix(m).qr();
    (from_dmatrix(&qr.q()), from_dmatrix(&qr.r()))
}

/// Thin LQ decomposition: for `m × n` input, `l` is `m × k` and `q` is `k × n`
/// with orthonormal rows, where `k = min(m, n)`.
pub(crate) fn lq<A>(m: &nd::Array2<A>) -> (nd::Array2<A>, nd::Array2<A>)
where A: ComplexScalar
{
    let (q, r) = qr(&adjoint(m));
    (adjoint(&r), adjoint(&q))
}

#[cfg(test)]
pub(crate) fn identity<A>(n: usize) -> nd::Array2<A>
where A: ComplexScalar
{
    nd::Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j { A::one() } else { A::zero() }
    })
}

/// Frobenius distance between two arrays of the same shape.
#[cfg(test)]
pub(crate) fn distance<A, D>(a: &nd::Array<A, D>, b: &nd::Array<A, D>) -> f64
where
    A: ComplexScalar,
    D: nd::Dimension,
{
    a.iter().zip(b.iter())
        .map(|(ak, bk)| (*ak - *bk).modulus_squared())
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;

    fn sample_matrix() -> nd::Array2<C64> {
        nd::Array2::from_shape_fn((4, 3), |(i, j)| {
            C64::new((i * 3 + j) as f64 - 2.5, (i as f64 - j as f64) * 0.5)
        })
    }

    #[test]
    fn svd_reconstructs_and_sorts() {
        let m = sample_matrix();
        let Svd { u, s, vt } = svd(&m);
        assert!(s.windows(2).all(|w| w[0] >= w[1]));
        let rec = scale_cols(&u, &s).dot(&vt);
        assert_abs_diff_eq!(distance(&m, &rec), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn qr_and_lq_are_orthogonal_factorizations() {
        let m = sample_matrix();
        let (q, r) = qr(&m);
        assert_eq!(q.dim(), (4, 3));
        assert_eq!(r.dim(), (3, 3));
        assert_abs_diff_eq!(distance(&m, &q.dot(&r)), 0.0, epsilon = 1e-10);
        let qhq = adjoint(&q).dot(&q);
        assert_abs_diff_eq!(distance(&qhq, &identity(3)), 0.0, epsilon = 1e-10);

        let mt = adjoint(&m);
        let (l, q) = lq(&mt);
        assert_eq!(q.dim(), (3, 4));
        assert_abs_diff_eq!(distance(&mt, &l.dot(&q)), 0.0, epsilon = 1e-10);
        let qqh = q.dot(&adjoint(&q));
        assert_abs_diff_eq!(distance(&qqh, &identity(3)), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn fusing_is_invertible() {
        let a: nd::Array3<f64>
            = nd::Array3::from_shape_fn((2, 3, 4), |(u, s, v)| {
                (u * 12 + s * 4 + v) as f64
            });
        let l = fuse_left(&a);
        assert_eq!(l.dim(), (6, 4));
        assert_eq!(split_left(&l, 2, 3), a);
        let r = fuse_right(&a);
        assert_eq!(r.dim(), (2, 12));
        assert_eq!(split_right(&r, 3, 4), a);
        assert_eq!(reshape_matrix(&l, 2, 12), r);
    }
}
