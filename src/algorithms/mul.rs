//! The multiplication engine: `a · b` for every pair of block variants.
//!
//! Unlike addition, multiplication returns a freshly shaped result; the
//! output variant is chosen per case. Products that touch a low-rank
//! operand stay low-rank, a pair of dense leaves yields a dense leaf, and
//! products involving a hierarchical operand recurse along that operand's
//! cluster tree:
//!
//! * hierarchical × hierarchical is the block 2×2 product
//!   `C[i][j] = a[i][0]·b[0][j] + a[i][1]·b[1][j]`, with the sum folded
//!   through the addition engine so ranks are truncated on the way up;
//! * dense × hierarchical (and its mirror) slices the dense operand into
//!   slabs matching the hierarchical operand's children, recursing until
//!   the dense operand's own cluster has no further split.

use crate::algorithms::truncation::Truncation;
use crate::cluster::Cluster;
use crate::error::{HMatrixError, HMatrixErrorKind};
use crate::hmatrix::{Block, HMatrix};
use faer::MatRef;
use std::sync::Arc;

impl HMatrix {
    /// Computes the product `self · rhs` as a new H-matrix.
    ///
    /// Requires `self.ncols() == rhs.nrows()`. The result's row cluster is
    /// `self`'s and its column cluster is `rhs`'s; rank growth in recursive
    /// cases is truncated according to `trunc`.
    pub fn matmul(&self, rhs: &HMatrix, trunc: &Truncation) -> Result<HMatrix, HMatrixError> {
        if self.ncols != rhs.nrows {
            return Err(HMatrixErrorKind::ShapeMismatch {
                op: "multiply",
                left_rows: self.nrows,
                left_cols: self.ncols,
                right_rows: rhs.nrows,
                right_cols: rhs.ncols,
            }
            .into());
        }
        match (&self.block, &rhs.block) {
            (Block::Dense { mat: a, .. }, Block::Dense { mat: b, .. }) => HMatrix::dense(
                a.as_ref() * b.as_ref(),
                self.row_cluster.clone(),
                rhs.col_cluster.clone(),
            ),
            (Block::Dense { mat: a, .. }, Block::LowRank { left, right }) => {
                if left.ncols() == 0 {
                    return HMatrix::zero(self.row_cluster.clone(), rhs.col_cluster.clone());
                }
                HMatrix::low_rank(
                    a.as_ref() * left.as_ref(),
                    right.clone(),
                    self.row_cluster.clone(),
                    rhs.col_cluster.clone(),
                )
            }
            (Block::Dense { mat: a, .. }, Block::Hierarchical { .. }) => {
                mul_dense_hier(a.as_ref(), &self.row_cluster, rhs, trunc)
            }
            (Block::LowRank { left, right }, Block::Dense { mat: b, .. }) => {
                if left.ncols() == 0 {
                    return HMatrix::zero(self.row_cluster.clone(), rhs.col_cluster.clone());
                }
                HMatrix::low_rank(
                    left.clone(),
                    b.transpose() * right.as_ref(),
                    self.row_cluster.clone(),
                    rhs.col_cluster.clone(),
                )
            }
            (
                Block::LowRank { left, right },
                Block::LowRank {
                    left: bl,
                    right: br,
                },
            ) => {
                if left.ncols() == 0 || bl.ncols() == 0 {
                    return HMatrix::zero(self.row_cluster.clone(), rhs.col_cluster.clone());
                }
                // (A₁B₁ᵀ)(A₂B₂ᵀ) = A₁ · (B₂ (A₂ᵀ B₁))ᵀ
                let coupling = bl.transpose() * right.as_ref();
                HMatrix::low_rank(
                    left.clone(),
                    br.as_ref() * coupling.as_ref(),
                    self.row_cluster.clone(),
                    rhs.col_cluster.clone(),
                )
            }
            (Block::LowRank { left, right }, Block::Hierarchical { .. }) => {
                if left.ncols() == 0 {
                    return HMatrix::zero(self.row_cluster.clone(), rhs.col_cluster.clone());
                }
                let b_dense = rhs.to_dense();
                HMatrix::low_rank(
                    left.clone(),
                    b_dense.transpose() * right.as_ref(),
                    self.row_cluster.clone(),
                    rhs.col_cluster.clone(),
                )
            }
            (Block::Hierarchical { .. }, Block::Dense { mat: b, .. }) => {
                mul_hier_dense(self, b.as_ref(), &rhs.col_cluster, trunc)
            }
            (
                Block::Hierarchical { .. },
                Block::LowRank {
                    left: bl,
                    right: br,
                },
            ) => {
                if bl.ncols() == 0 {
                    return HMatrix::zero(self.row_cluster.clone(), rhs.col_cluster.clone());
                }
                let a_dense = self.to_dense();
                HMatrix::low_rank(
                    a_dense.as_ref() * bl.as_ref(),
                    br.clone(),
                    self.row_cluster.clone(),
                    rhs.col_cluster.clone(),
                )
            }
            (
                Block::Hierarchical { children: lc },
                Block::Hierarchical { children: rc },
            ) => {
                if lc[0][0].ncols != rc[0][0].nrows {
                    return Err(HMatrixErrorKind::ShapeMismatch {
                        op: "multiply (child split)",
                        left_rows: lc[0][0].nrows,
                        left_cols: lc[0][0].ncols,
                        right_rows: rc[0][0].nrows,
                        right_cols: rc[0][0].ncols,
                    }
                    .into());
                }
                let part = |i: usize, j: usize| -> Result<HMatrix, HMatrixError> {
                    let mut c = lc[i][0].matmul(&rc[0][j], trunc)?;
                    c.add_assign_scaled(&lc[i][1].matmul(&rc[1][j], trunc)?, 1.0, trunc)?;
                    Ok(c)
                };
                let children = [
                    [part(0, 0)?, part(0, 1)?],
                    [part(1, 0)?, part(1, 1)?],
                ];
                HMatrix::hierarchical(
                    children,
                    self.row_cluster.clone(),
                    rhs.col_cluster.clone(),
                )
            }
        }
    }
}

/// Dense × hierarchical: slice the dense operand along its own row cluster
/// and the hierarchical operand's row split, producing a hierarchical
/// result. When the dense operand's row cluster has no further split the
/// recursion terminates by materializing the hierarchical side.
fn mul_dense_hier(
    a: MatRef<'_, f64>,
    s: &Arc<Cluster>,
    b: &HMatrix,
    trunc: &Truncation,
) -> Result<HMatrix, HMatrixError> {
    let Some((sl, sr)) = s.children() else {
        return HMatrix::dense(
            a * b.to_dense().as_ref(),
            s.clone(),
            b.col_cluster.clone(),
        );
    };
    let Block::Hierarchical { children: bc } = &b.block else {
        // Caller guarantees a hierarchical right operand.
        return Err(HMatrixErrorKind::Invariant(
            "dense-by-hierarchical product requires a hierarchical right operand".to_string(),
        )
        .into());
    };
    let (brl, brr) = b.row_cluster.children().ok_or_else(|| {
        HMatrixError::from(HMatrixErrorKind::Invariant(
            "hierarchical operand with a leaf row cluster".to_string(),
        ))
    })?;
    let (m1, m2) = (sl.len(), sr.len());
    let (n1, n2) = (bc[0][0].nrows, bc[1][1].nrows);

    let slab = |ro: usize, mm: usize, co: usize, nn: usize, sc: &Arc<Cluster>, tc: &Arc<Cluster>| {
        HMatrix::dense(a.submatrix(ro, co, mm, nn).to_owned(), sc.clone(), tc.clone())
    };
    let part = |i: usize, j: usize| -> Result<HMatrix, HMatrixError> {
        let (ro, mm, sc) = if i == 0 { (0, m1, sl) } else { (m1, m2, sr) };
        let a_k1 = slab(ro, mm, 0, n1, sc, brl)?;
        let a_k2 = slab(ro, mm, n1, n2, sc, brr)?;
        let mut c = a_k1.matmul(&bc[0][j], trunc)?;
        c.add_assign_scaled(&a_k2.matmul(&bc[1][j], trunc)?, 1.0, trunc)?;
        Ok(c)
    };
    let children = [
        [part(0, 0)?, part(0, 1)?],
        [part(1, 0)?, part(1, 1)?],
    ];
    HMatrix::hierarchical(children, s.clone(), b.col_cluster.clone())
}

/// Hierarchical × dense, the mirror of [`mul_dense_hier`]: the dense operand
/// is sliced along the hierarchical operand's column split and its own
/// column cluster.
fn mul_hier_dense(
    a: &HMatrix,
    b: MatRef<'_, f64>,
    t: &Arc<Cluster>,
    trunc: &Truncation,
) -> Result<HMatrix, HMatrixError> {
    let Some((tl, tr)) = t.children() else {
        return HMatrix::dense(
            a.to_dense().as_ref() * b,
            a.row_cluster.clone(),
            t.clone(),
        );
    };
    let Block::Hierarchical { children: ac } = &a.block else {
        return Err(HMatrixErrorKind::Invariant(
            "hierarchical-by-dense product requires a hierarchical left operand".to_string(),
        )
        .into());
    };
    let (acl, acr) = a.col_cluster.children().ok_or_else(|| {
        HMatrixError::from(HMatrixErrorKind::Invariant(
            "hierarchical operand with a leaf column cluster".to_string(),
        ))
    })?;
    let (k1, k2) = (ac[0][0].ncols, ac[1][1].ncols);
    let (n1, n2) = (tl.len(), tr.len());

    let slab = |ro: usize, kk: usize, co: usize, nn: usize, sc: &Arc<Cluster>, tc: &Arc<Cluster>| {
        HMatrix::dense(b.submatrix(ro, co, kk, nn).to_owned(), sc.clone(), tc.clone())
    };
    let part = |i: usize, j: usize| -> Result<HMatrix, HMatrixError> {
        let (co, nn, tc) = if j == 0 { (0, n1, tl) } else { (n1, n2, tr) };
        let b_1j = slab(0, k1, co, nn, acl, tc)?;
        let b_2j = slab(k1, k2, co, nn, acr, tc)?;
        let mut c = ac[i][0].matmul(&b_1j, trunc)?;
        c.add_assign_scaled(&ac[i][1].matmul(&b_2j, trunc)?, 1.0, trunc)?;
        Ok(c)
    };
    let children = [
        [part(0, 0)?, part(0, 1)?],
        [part(1, 0)?, part(1, 1)?],
    ];
    HMatrix::hierarchical(children, a.row_cluster.clone(), t.clone())
}
