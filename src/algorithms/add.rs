//! The addition engine: `a ← a + s·b` for every pair of block variants.
//!
//! The defining guarantee is **format preservation**: the storage form of
//! `a` never changes, whatever `b` looks like. Rank growth in a low-rank
//! target is absorbed by truncation, not by switching to dense storage.
//!
//! The nine variant pairs reduce to three right-hand-side shapes. A dense
//! or low-rank right-hand side is passed down as raw factor views and
//! sliced at the cluster split of `a`'s children; a hierarchical right-hand
//! side either recurses child-by-child (when `a` is hierarchical too) or is
//! materialized once and handled as dense.

use crate::algorithms::truncation::{self, Truncation};
use crate::error::{HMatrixError, HMatrixErrorKind};
use crate::hmatrix::{Block, HMatrix};
use crate::kernels;
use faer::{Accum, Mat, MatRef};

impl HMatrix {
    /// In-place scaled addition `self ← self + s·rhs`.
    ///
    /// The storage format of `self` is preserved; any rank growth is
    /// truncated according to `trunc`. The operands must have identical
    /// shapes, and hierarchical operands must agree on their child splits
    /// (which is guaranteed when both were built over the same cluster
    /// tree).
    pub fn add_assign_scaled(
        &mut self,
        rhs: &HMatrix,
        s: f64,
        trunc: &Truncation,
    ) -> Result<(), HMatrixError> {
        if self.shape() != rhs.shape() {
            return Err(HMatrixErrorKind::ShapeMismatch {
                op: "add",
                left_rows: self.nrows,
                left_cols: self.ncols,
                right_rows: rhs.nrows,
                right_cols: rhs.ncols,
            }
            .into());
        }
        match &rhs.block {
            Block::Dense { mat, .. } => self.add_dense_in_place(mat.as_ref(), s, trunc),
            Block::LowRank { left, right } => {
                self.add_outer_product_in_place(left.as_ref(), right.as_ref(), s, trunc)
            }
            Block::Hierarchical { children: rc } => match &mut self.block {
                Block::Hierarchical { children: lc } => {
                    if lc[0][0].shape() != rc[0][0].shape() {
                        return Err(HMatrixErrorKind::ShapeMismatch {
                            op: "add (child split)",
                            left_rows: lc[0][0].nrows,
                            left_cols: lc[0][0].ncols,
                            right_rows: rc[0][0].nrows,
                            right_cols: rc[0][0].ncols,
                        }
                        .into());
                    }
                    for i in 0..2 {
                        for j in 0..2 {
                            lc[i][j].add_assign_scaled(&rc[i][j], s, trunc)?;
                        }
                    }
                    Ok(())
                }
                // Dense or low-rank target: materialize the hierarchical
                // side once and fall through to the dense path.
                _ => {
                    let dense_rhs = rhs.to_dense();
                    self.add_dense_in_place(dense_rhs.as_ref(), s, trunc)
                }
            },
        }
    }

    /// Scaled addition returning a new H-matrix with the format of `self`.
    pub fn add_scaled(
        &self,
        rhs: &HMatrix,
        s: f64,
        trunc: &Truncation,
    ) -> Result<HMatrix, HMatrixError> {
        let mut out = self.clone();
        out.add_assign_scaled(rhs, s, trunc)?;
        Ok(out)
    }

    /// `self ← self + s·b` for an explicitly stored right-hand side.
    fn add_dense_in_place(
        &mut self,
        b: MatRef<'_, f64>,
        s: f64,
        trunc: &Truncation,
    ) -> Result<(), HMatrixError> {
        match &mut self.block {
            Block::Dense { mat, .. } => {
                kernels::axpy(mat, s, b);
                Ok(())
            }
            Block::LowRank { left, right } => {
                // Form the dense sum, then recompress to preserve the
                // low-rank format.
                let mut sum = if left.ncols() == 0 {
                    Mat::zeros(b.nrows(), b.ncols())
                } else {
                    left.as_ref() * right.transpose()
                };
                kernels::axpy(&mut sum, s, b);
                let (l, r) = truncation::compress(sum.as_ref(), trunc)?;
                *left = l;
                *right = r;
                Ok(())
            }
            Block::Hierarchical { children } => {
                let m1 = children[0][0].nrows;
                let n1 = children[0][0].ncols;
                for (i, row) in children.iter_mut().enumerate() {
                    for (j, child) in row.iter_mut().enumerate() {
                        let ro = if i == 0 { 0 } else { m1 };
                        let co = if j == 0 { 0 } else { n1 };
                        let sub = b.submatrix(ro, co, child.nrows, child.ncols);
                        child.add_dense_in_place(sub, s, trunc)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// `self ← self + s·(bl·brᵀ)` for a low-rank right-hand side given by
    /// its factors.
    fn add_outer_product_in_place(
        &mut self,
        bl: MatRef<'_, f64>,
        br: MatRef<'_, f64>,
        s: f64,
        trunc: &Truncation,
    ) -> Result<(), HMatrixError> {
        match &mut self.block {
            Block::Dense { mat, .. } => {
                if bl.ncols() > 0 {
                    kernels::gemm(mat.as_mut(), Accum::Add, bl, br.transpose(), s);
                }
                Ok(())
            }
            Block::LowRank { left, right } => {
                let (l, r) = truncation::rounded_add(
                    left.as_ref(),
                    right.as_ref(),
                    bl,
                    br,
                    s,
                    trunc,
                )?;
                *left = l;
                *right = r;
                Ok(())
            }
            Block::Hierarchical { children } => {
                // Slice both factors by rows at the child split: each child
                // receives the outer product of its own row/column slabs.
                let m1 = children[0][0].nrows;
                let n1 = children[0][0].ncols;
                for (i, row) in children.iter_mut().enumerate() {
                    for (j, child) in row.iter_mut().enumerate() {
                        let ro = if i == 0 { 0 } else { m1 };
                        let co = if j == 0 { 0 } else { n1 };
                        let bl_i = bl.subrows(ro, child.nrows);
                        let br_j = br.subrows(co, child.ncols);
                        child.add_outer_product_in_place(bl_i, br_j, s, trunc)?;
                    }
                }
                Ok(())
            }
        }
    }
}
