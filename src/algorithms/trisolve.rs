//! Triangular solves with an H-matrix right-hand side.
//!
//! Two orientations cover both call sites of the block LU recursion:
//!
//! * [`HMatrix::solve_lower_triangular_in_place`] solves `L·X = B`,
//!   reading only the (unit or non-unit) lower triangle of the left
//!   operand's dense leaves. LU uses it with a unit diagonal to form the
//!   `U₁₂` sub-block.
//! * [`HMatrix::solve_upper_triangular_right_in_place`] solves `X·U = B`,
//!   reading only the upper triangle. LU uses it with a non-unit diagonal
//!   to form the `L₂₁` sub-block. At dense leaves the right-sided system
//!   is handed to the kernel through transposed views; no operand is ever
//!   transposed in storage.
//!
//! The triangular operand is typically an LU-factorized H-matrix whose
//! dense leaves pack both factors; reading only one triangle is what makes
//! the packed storage usable. A low-rank triangular operand is a contract
//! violation and is reported as an error.

use crate::algorithms::truncation::Truncation;
use crate::cluster::Cluster;
use crate::error::{HMatrixError, HMatrixErrorKind};
use crate::hmatrix::{Block, HMatrix};
use crate::kernels;
use faer::MatRef;
use std::sync::Arc;

impl HMatrix {
    /// Solves `self · X = rhs` in place, where `self` is lower triangular
    /// (optionally unit-diagonal). Only the lower triangle of dense leaves
    /// is read; `rhs` is overwritten with `X` and keeps its storage format.
    pub fn solve_lower_triangular_in_place(
        &self,
        rhs: &mut HMatrix,
        unit_diagonal: bool,
        trunc: &Truncation,
    ) -> Result<(), HMatrixError> {
        check_triangular_shapes(self, rhs.nrows, "lower triangular solve")?;
        solve_lower(self, rhs, unit_diagonal, trunc)
    }

    /// Solves `X · self = rhs` in place, where `self` is upper triangular
    /// (optionally unit-diagonal). Only the upper triangle of dense leaves
    /// is read; `rhs` is overwritten with `X` and keeps its storage format.
    pub fn solve_upper_triangular_right_in_place(
        &self,
        rhs: &mut HMatrix,
        unit_diagonal: bool,
        trunc: &Truncation,
    ) -> Result<(), HMatrixError> {
        check_triangular_shapes(self, rhs.ncols, "upper triangular solve")?;
        solve_upper_right(self, rhs, unit_diagonal, trunc)
    }
}

fn check_triangular_shapes(
    a: &HMatrix,
    rhs_extent: usize,
    op: &'static str,
) -> Result<(), HMatrixError> {
    if a.nrows != a.ncols || a.nrows != rhs_extent {
        return Err(HMatrixErrorKind::ShapeMismatch {
            op,
            left_rows: a.nrows,
            left_cols: a.ncols,
            right_rows: rhs_extent,
            right_cols: rhs_extent,
        }
        .into());
    }
    Ok(())
}

/// Splits a square dense matrix into a transient 2×2 hierarchical wrapper
/// aligned with `cluster`, so the hierarchical recursion can be reused when
/// a dense triangle meets a hierarchical right-hand side.
fn split_square_dense(
    mat: MatRef<'_, f64>,
    cluster: &Arc<Cluster>,
) -> Result<HMatrix, HMatrixError> {
    let (left, right) = cluster.children().ok_or_else(|| {
        HMatrixError::from(HMatrixErrorKind::Invariant(
            "cannot split a dense block along a leaf cluster".to_string(),
        ))
    })?;
    let (m1, m2) = (left.len(), right.len());
    let sub = |ro: usize, co: usize, rr: usize, cc: usize, sc: &Arc<Cluster>, tc: &Arc<Cluster>| {
        HMatrix::dense(mat.submatrix(ro, co, rr, cc).to_owned(), sc.clone(), tc.clone())
    };
    let children = [
        [sub(0, 0, m1, m1, left, left)?, sub(0, m1, m1, m2, left, right)?],
        [sub(m1, 0, m2, m1, right, left)?, sub(m1, m1, m2, m2, right, right)?],
    ];
    HMatrix::hierarchical(children, cluster.clone(), cluster.clone())
}

fn solve_lower(
    a: &HMatrix,
    b: &mut HMatrix,
    unit: bool,
    trunc: &Truncation,
) -> Result<(), HMatrixError> {
    match &a.block {
        Block::LowRank { .. } => Err(HMatrixErrorKind::LowRankOperand {
            op: "Triangular solve",
        }
        .into()),
        Block::Dense { mat, .. } => match &mut b.block {
            Block::Dense { mat: rhs, .. } => {
                kernels::trtrs_lower(unit, mat.as_ref(), rhs.as_mut());
                Ok(())
            }
            Block::LowRank { left, .. } => {
                // Only the factor on the triangular side is touched.
                if left.ncols() > 0 {
                    kernels::trtrs_lower(unit, mat.as_ref(), left.as_mut());
                }
                Ok(())
            }
            Block::Hierarchical { .. } => {
                let a_split = split_square_dense(mat.as_ref(), &b.row_cluster)?;
                solve_lower(&a_split, b, unit, trunc)
            }
        },
        Block::Hierarchical { children: ac } => match &mut b.block {
            Block::Hierarchical { children: bc } => {
                if ac[0][0].ncols != bc[0][0].nrows {
                    return Err(HMatrixErrorKind::ShapeMismatch {
                        op: "lower triangular solve (child split)",
                        left_rows: ac[0][0].nrows,
                        left_cols: ac[0][0].ncols,
                        right_rows: bc[0][0].nrows,
                        right_cols: bc[0][0].ncols,
                    }
                    .into());
                }
                let [[a11, _a12], [a21, a22]] = &**ac;
                let [[b11, b12], [b21, b22]] = &mut **bc;
                solve_lower(a11, b11, unit, trunc)?;
                solve_lower(a11, b12, unit, trunc)?;
                b21.add_assign_scaled(&a21.matmul(b11, trunc)?, -1.0, trunc)?;
                b22.add_assign_scaled(&a21.matmul(b12, trunc)?, -1.0, trunc)?;
                solve_lower(a22, b21, unit, trunc)?;
                solve_lower(a22, b22, unit, trunc)?;
                Ok(())
            }
            // Dense or low-rank right-hand side under a hierarchical
            // triangle: materialize the triangle once and solve densely.
            _ => {
                let a_dense = HMatrix::dense(
                    a.to_dense(),
                    a.row_cluster.clone(),
                    a.col_cluster.clone(),
                )?;
                solve_lower(&a_dense, b, unit, trunc)
            }
        },
    }
}

fn solve_upper_right(
    a: &HMatrix,
    b: &mut HMatrix,
    unit: bool,
    trunc: &Truncation,
) -> Result<(), HMatrixError> {
    match &a.block {
        Block::LowRank { .. } => Err(HMatrixErrorKind::LowRankOperand {
            op: "Triangular solve",
        }
        .into()),
        Block::Dense { mat, .. } => match &mut b.block {
            Block::Dense { mat: rhs, .. } => {
                kernels::trtrs_upper_from_right(unit, mat.as_ref(), rhs.as_mut());
                Ok(())
            }
            Block::LowRank { right, .. } => {
                // X·U = L·Rᵀ keeps L and maps R through U⁻ᵀ, which is a
                // lower solve against the transposed triangle.
                if right.ncols() > 0 {
                    kernels::trtrs_lower(unit, mat.transpose(), right.as_mut());
                }
                Ok(())
            }
            Block::Hierarchical { .. } => {
                let a_split = split_square_dense(mat.as_ref(), &b.col_cluster)?;
                solve_upper_right(&a_split, b, unit, trunc)
            }
        },
        Block::Hierarchical { children: ac } => match &mut b.block {
            Block::Hierarchical { children: bc } => {
                if ac[0][0].nrows != bc[0][0].ncols {
                    return Err(HMatrixErrorKind::ShapeMismatch {
                        op: "upper triangular solve (child split)",
                        left_rows: ac[0][0].nrows,
                        left_cols: ac[0][0].ncols,
                        right_rows: bc[0][0].nrows,
                        right_cols: bc[0][0].ncols,
                    }
                    .into());
                }
                let [[a11, a12], [_a21, a22]] = &**ac;
                let [[b11, b12], [b21, b22]] = &mut **bc;
                solve_upper_right(a11, b11, unit, trunc)?;
                solve_upper_right(a11, b21, unit, trunc)?;
                b12.add_assign_scaled(&b11.matmul(a12, trunc)?, -1.0, trunc)?;
                b22.add_assign_scaled(&b21.matmul(a12, trunc)?, -1.0, trunc)?;
                solve_upper_right(a22, b12, unit, trunc)?;
                solve_upper_right(a22, b22, unit, trunc)?;
                Ok(())
            }
            _ => {
                let a_dense = HMatrix::dense(
                    a.to_dense(),
                    a.row_cluster.clone(),
                    a.col_cluster.clone(),
                )?;
                solve_upper_right(&a_dense, b, unit, trunc)
            }
        },
    }
}
