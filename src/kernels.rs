//! Thin adapter over the dense kernels the engine consumes.
//!
//! The H-matrix layer needs exactly five dense operations: GEMM, partially
//! pivoted LU, triangular solves, thin QR, and thin SVD. Everything else in
//! the crate is recursion and book-keeping. Funnelling the five through this
//! module keeps the [`faer`] surface in one place and fixes the pivot-base
//! convention at a single boundary.
//!
//! Pivot convention: permutation vectors are 0-based and are read as
//! `permuted[i] = original[p[i]]`, matching `faer`'s forward permutation
//! array. This is the only place where the convention is established; the
//! rest of the crate composes and splits such vectors without reinterpreting
//! them.

use crate::error::{HMatrixError, HMatrixErrorKind};
use faer::linalg::matmul::matmul;
use faer::linalg::solvers::PartialPivLu;
use faer::linalg::triangular_solve::{
    solve_lower_triangular_in_place, solve_unit_lower_triangular_in_place,
    solve_unit_upper_triangular_in_place, solve_upper_triangular_in_place,
};
use faer::{Accum, Mat, MatMut, MatRef, Par};

/// `dst ← dst + alpha · lhs · rhs` (or `dst ← alpha · lhs · rhs` with
/// [`Accum::Replace`]). Sequential, double precision, column-major — the
/// GEMM contract of the engine.
#[inline]
pub(crate) fn gemm(
    dst: MatMut<'_, f64>,
    accum: Accum,
    lhs: MatRef<'_, f64>,
    rhs: MatRef<'_, f64>,
    alpha: f64,
) {
    matmul(dst, accum, lhs, rhs, alpha, Par::Seq);
}

/// `y ← y + alpha · x`, the AXPY kernel of the adapter.
pub(crate) fn axpy(y: &mut Mat<f64>, alpha: f64, x: MatRef<'_, f64>) {
    debug_assert_eq!(y.nrows(), x.nrows());
    debug_assert_eq!(y.ncols(), x.ncols());
    let mut y = y.as_mut();
    for j in 0..x.ncols() {
        for i in 0..x.nrows() {
            y[(i, j)] += alpha * x[(i, j)];
        }
    }
}

/// Partially pivoted LU factorization (GETRF).
///
/// Overwrites `c` with the packed factors — `L` strictly below the diagonal
/// (unit diagonal implied) and `U` on and above — and returns the 0-based
/// row pivot vector. An exactly zero pivot is reported as
/// [`HMatrixErrorKind::ZeroPivot`].
pub(crate) fn getrf(c: &mut Mat<f64>) -> Result<Vec<usize>, HMatrixError> {
    let lu = PartialPivLu::new(c.as_ref());
    let u = lu.U();
    for i in 0..Ord::min(u.nrows(), u.ncols()) {
        if u[(i, i)] == 0.0 {
            return Err(HMatrixErrorKind::ZeroPivot { index: i }.into());
        }
    }
    let l = lu.L();
    let (m, n) = (c.nrows(), c.ncols());
    let packed = Mat::from_fn(m, n, |i, j| if i > j { l[(i, j)] } else { u[(i, j)] });
    *c = packed;
    Ok(lu.P().arrays().0.to_vec())
}

/// Left triangular solve (TRTRS): overwrites `rhs` with `A⁻¹ · rhs`, where
/// only the lower triangle of `a` is read.
#[inline]
pub(crate) fn trtrs_lower(unit_diagonal: bool, a: MatRef<'_, f64>, rhs: MatMut<'_, f64>) {
    if unit_diagonal {
        solve_unit_lower_triangular_in_place(a, rhs, Par::Seq);
    } else {
        solve_lower_triangular_in_place(a, rhs, Par::Seq);
    }
}

/// Left triangular solve (TRTRS): overwrites `rhs` with `A⁻¹ · rhs`, where
/// only the upper triangle of `a` is read.
#[inline]
pub(crate) fn trtrs_upper(unit_diagonal: bool, a: MatRef<'_, f64>, rhs: MatMut<'_, f64>) {
    if unit_diagonal {
        solve_unit_upper_triangular_in_place(a, rhs, Par::Seq);
    } else {
        solve_upper_triangular_in_place(a, rhs, Par::Seq);
    }
}

/// Right triangular solve: overwrites `rhs` with `rhs · A⁻¹`, where only the
/// upper triangle of `a` is read.
///
/// Realized through the identity `X·U = B  ⇔  Uᵀ·Xᵀ = Bᵀ`: the transposed
/// views turn the problem into a left lower solve without copying either
/// operand.
#[inline]
pub(crate) fn trtrs_upper_from_right(
    unit_diagonal: bool,
    a: MatRef<'_, f64>,
    rhs: MatMut<'_, f64>,
) {
    trtrs_lower(unit_diagonal, a.transpose(), rhs.transpose_mut());
}

/// Thin QR factorization: returns `(Q, R)` with `Q` of shape `m×min(m,n)`
/// and `R` of shape `min(m,n)×n`.
pub(crate) fn qr_thin(a: MatRef<'_, f64>) -> (Mat<f64>, Mat<f64>) {
    let qr = a.qr();
    (qr.compute_thin_Q(), qr.thin_R().to_owned())
}

/// Thin SVD: returns `(U, σ, V)` with singular values in non-increasing
/// order and `A ≈ U · diag(σ) · Vᵀ`.
pub(crate) fn svd_thin(a: MatRef<'_, f64>) -> Result<(Mat<f64>, Vec<f64>, Mat<f64>), HMatrixError> {
    let svd = a
        .thin_svd()
        .map_err(|e| HMatrixError::from(HMatrixErrorKind::SvdFailure(e)))?;
    let s = svd.S();
    let sigma = (0..s.dim()).map(|i| s[i]).collect();
    Ok((svd.U().to_owned(), sigma, svd.V().to_owned()))
}
