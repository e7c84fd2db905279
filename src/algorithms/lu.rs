//! In-place block LU factorization with partial pivoting, and the solve
//! against the factorized form.
//!
//! The factorization recurses through the 2×2 block structure:
//!
//! ```text
//! lu(H11);  H12 ← P11·H12;  H12 ← L11⁻¹·H12;  H21 ← H21·U11⁻¹;
//! H22 ← H22 − H21·H12;  lu(H22);  H21 ← P22·H21
//! ```
//!
//! Dense leaves are factorized by the pivoted dense kernel and keep both
//! packed factors and their pivot vector; the permutation of a hierarchical
//! node is the composition `[P11 ; P22 + m1]`, computed on demand by
//! [`HMatrix::pivots`] rather than stored redundantly.
//!
//! Pivoting never moves a row across a block boundary: the pivot search is
//! confined to the dense leaf that owns the pivot column, so each composed
//! permutation maps the upper and lower halves of a block onto themselves.
//! [`HMatrix::permute_rows`] asserts this invariant on every recursion and
//! rejects any permutation that violates it.

use crate::algorithms::truncation::Truncation;
use crate::error::{HMatrixError, HMatrixErrorKind};
use crate::hmatrix::{Block, HMatrix};
use crate::kernels;
use faer::prelude::*;
use faer::{Mat, MatMut, MatRef};

impl HMatrix {
    /// Factorizes `self` in place as `P·A = L·U`.
    ///
    /// Dense leaves end up holding packed LU factors (`L` strictly below
    /// the diagonal with an implied unit diagonal, `U` on and above) plus a
    /// pivot vector; off-diagonal blocks are overwritten by the
    /// corresponding `L` and `U` sub-blocks in their original storage
    /// format, with Schur-complement updates truncated according to
    /// `trunc`.
    pub fn lu_in_place(&mut self, trunc: &Truncation) -> Result<(), HMatrixError> {
        if self.nrows != self.ncols {
            return Err(HMatrixErrorKind::ShapeMismatch {
                op: "LU factorization",
                left_rows: self.nrows,
                left_cols: self.ncols,
                right_rows: self.nrows,
                right_cols: self.ncols,
            }
            .into());
        }
        match &mut self.block {
            Block::Dense { mat, pivots } => {
                *pivots = Some(kernels::getrf(mat)?);
                Ok(())
            }
            Block::LowRank { .. } => Err(HMatrixErrorKind::LowRankOperand {
                op: "LU factorization",
            }
            .into()),
            Block::Hierarchical { children } => {
                log::debug!(
                    "block LU: {}x{} hierarchical node, split at {}",
                    self.nrows,
                    self.ncols,
                    children[0][0].nrows
                );
                let [[h11, h12], [h21, h22]] = &mut **children;
                h11.lu_in_place(trunc)?;
                // Propagate the pivoting of the (1,1) block to its
                // row-aligned right neighbor before solving against L11.
                let p11 = h11.pivots()?;
                h12.permute_rows(&p11)?;
                h11.solve_lower_triangular_in_place(h12, true, trunc)?;
                h11.solve_upper_triangular_right_in_place(h21, false, trunc)?;
                // Schur complement, truncated on the way through the
                // addition engine.
                let update = h21.matmul(h12, trunc)?;
                h22.add_assign_scaled(&update, -1.0, trunc)?;
                h22.lu_in_place(trunc)?;
                let p22 = h22.pivots()?;
                h21.permute_rows(&p22)?;
                Ok(())
            }
        }
    }

    /// The composed row permutation of a factorized H-matrix: a dense leaf
    /// reports its pivot vector, a hierarchical node reports
    /// `[P11 ; P22 + m1]`.
    ///
    /// Fails if any diagonal dense leaf has not been factorized.
    pub fn pivots(&self) -> Result<Vec<usize>, HMatrixError> {
        match &self.block {
            Block::Dense {
                pivots: Some(p), ..
            } => Ok(p.clone()),
            Block::Dense { pivots: None, .. } => Err(HMatrixErrorKind::NotFactorized {
                op: "Pivot extraction",
            }
            .into()),
            Block::LowRank { .. } => Err(HMatrixErrorKind::LowRankOperand {
                op: "Pivot extraction",
            }
            .into()),
            Block::Hierarchical { children } => {
                let m1 = children[0][0].nrows;
                let mut p = children[0][0].pivots()?;
                p.extend(children[1][1].pivots()?.iter().map(|&i| i + m1));
                Ok(p)
            }
        }
    }

    /// Applies a row permutation (`permuted[i] = original[perm[i]]`) to all
    /// row-aligned descendants of this block.
    ///
    /// For a hierarchical block the permutation must map each half of the
    /// row range onto itself; a permutation that crosses the child split is
    /// rejected, since block LU can never produce one.
    pub fn permute_rows(&mut self, perm: &[usize]) -> Result<(), HMatrixError> {
        if perm.len() != self.nrows {
            return Err(HMatrixErrorKind::Invariant(format!(
                "permutation of length {} applied to a {}-row block",
                perm.len(),
                self.nrows
            ))
            .into());
        }
        match &mut self.block {
            Block::Dense { mat, .. } => {
                let permuted = Mat::from_fn(mat.nrows(), mat.ncols(), |i, j| mat[(perm[i], j)]);
                *mat = permuted;
                Ok(())
            }
            Block::LowRank { left, .. } => {
                let permuted =
                    Mat::from_fn(left.nrows(), left.ncols(), |i, j| left[(perm[i], j)]);
                *left = permuted;
                Ok(())
            }
            Block::Hierarchical { children } => {
                let m1 = children[0][0].nrows;
                let crosses = perm[..m1].iter().any(|&i| i >= m1)
                    || perm[m1..].iter().any(|&i| i < m1);
                if crosses {
                    return Err(HMatrixErrorKind::PermutationCrossesSplit {
                        split: m1,
                        rows: self.nrows,
                    }
                    .into());
                }
                let p1 = &perm[..m1];
                let p2: Vec<usize> = perm[m1..].iter().map(|&i| i - m1).collect();
                let [top, bottom] = &mut **children;
                for child in top.iter_mut() {
                    child.permute_rows(p1)?;
                }
                for child in bottom.iter_mut() {
                    child.permute_rows(&p2)?;
                }
                Ok(())
            }
        }
    }

    /// Solves `A·x = rhs` against the factorized form: applies the composed
    /// permutation, forward-substitutes through the unit-lower factor, and
    /// back-substitutes through the upper factor.
    ///
    /// `rhs` may carry several right-hand sides as columns. The matrix must
    /// have been factorized with [`HMatrix::lu_in_place`].
    pub fn solve(&self, rhs: MatRef<'_, f64>) -> Result<Mat<f64>, HMatrixError> {
        if self.nrows != self.ncols || rhs.nrows() != self.nrows {
            return Err(HMatrixErrorKind::ShapeMismatch {
                op: "solve",
                left_rows: self.nrows,
                left_cols: self.ncols,
                right_rows: rhs.nrows(),
                right_cols: rhs.ncols(),
            }
            .into());
        }
        let p = self.pivots()?;
        let mut x = Mat::from_fn(rhs.nrows(), rhs.ncols(), |i, j| rhs[(p[i], j)]);
        self.forward_substitute(x.as_mut())?;
        self.back_substitute(x.as_mut())?;
        Ok(x)
    }

    /// `y ← L⁻¹·y` with the unit-lower factor of the factorized form.
    fn forward_substitute(&self, y: MatMut<'_, f64>) -> Result<(), HMatrixError> {
        match &self.block {
            Block::Dense { mat, .. } => {
                kernels::trtrs_lower(true, mat.as_ref(), y);
                Ok(())
            }
            Block::LowRank { .. } => Err(HMatrixErrorKind::LowRankOperand {
                op: "Forward substitution",
            }
            .into()),
            Block::Hierarchical { children } => {
                let m1 = children[0][0].nrows;
                let (mut y1, mut y2) = y.split_at_row_mut(m1);
                children[0][0].forward_substitute(y1.rb_mut())?;
                children[1][0].matvec_acc(y2.rb_mut(), y1.rb(), -1.0);
                children[1][1].forward_substitute(y2)?;
                Ok(())
            }
        }
    }

    /// `y ← U⁻¹·y` with the upper factor of the factorized form.
    fn back_substitute(&self, y: MatMut<'_, f64>) -> Result<(), HMatrixError> {
        match &self.block {
            Block::Dense { mat, .. } => {
                kernels::trtrs_upper(false, mat.as_ref(), y);
                Ok(())
            }
            Block::LowRank { .. } => Err(HMatrixErrorKind::LowRankOperand {
                op: "Back substitution",
            }
            .into()),
            Block::Hierarchical { children } => {
                let m1 = children[0][0].nrows;
                let (mut y1, mut y2) = y.split_at_row_mut(m1);
                children[1][1].back_substitute(y2.rb_mut())?;
                children[0][1].matvec_acc(y1.rb_mut(), y2.rb(), -1.0);
                children[0][0].back_substitute(y1)?;
                Ok(())
            }
        }
    }
}
