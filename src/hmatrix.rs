//! The hierarchical-matrix data type and its structural operations.
//!
//! An [`HMatrix`] node represents an `m×n` matrix in exactly one of three
//! forms:
//!
//! * **Dense** — the entries are stored explicitly. After an LU
//!   factorization the same storage holds the packed factors together with
//!   a row pivot vector.
//! * **Low-rank** — the block is stored as an outer product `A·Bᵀ` with
//!   `A: m×k` and `B: n×k`. `k = 0` is legal and denotes the zero matrix.
//! * **Hierarchical** — a 2×2 block partition whose four children are
//!   themselves H-matrices.
//!
//! The "exactly one of three" rule is structural: the variants are arms of
//! an enum, so an inconsistent node cannot be represented. The shape
//! invariants that *can* be violated — children whose sizes do not sum to
//! the parent, factor matrices with mismatched ranks, blocks that disagree
//! with their clusters — are enforced by the constructors, which are the
//! only public way to build a node.
//!
//! Every node carries [`Arc`] references to the row cluster `s` and column
//! cluster `t` that define its index range. The recursive engines use the
//! cluster tree, never `m/2`, to size child blocks, so two H-matrices built
//! over the same tree always have compatible splits.

use crate::cluster::Cluster;
use crate::error::{HMatrixError, HMatrixErrorKind};
use crate::kernels;
use faer::prelude::*;
use faer::{Accum, Mat, MatMut, MatRef};
use std::sync::Arc;

/// The three storage forms of an H-matrix node.
#[derive(Debug, Clone)]
pub(crate) enum Block {
    /// Explicitly stored entries; `pivots` is present only after an LU
    /// factorization, in which case `mat` holds the packed factors.
    Dense {
        mat: Mat<f64>,
        pivots: Option<Vec<usize>>,
    },
    /// The outer product `left · rightᵀ`; both factors have the same number
    /// of columns (the rank bound of the block).
    LowRank { left: Mat<f64>, right: Mat<f64> },
    /// A 2×2 block partition, indexed `children[row][col]`.
    Hierarchical { children: Box<[[HMatrix; 2]; 2]> },
}

/// A matrix stored as a recursive 2×2 block partition in which far-field
/// blocks are compressed to low rank.
///
/// Nodes are exclusively owned by their parent; the cluster tree they
/// reference is immutable and shared. [`Clone`] performs a deep copy of all
/// block data while sharing the cluster tree.
#[derive(Debug, Clone)]
pub struct HMatrix {
    pub(crate) nrows: usize,
    pub(crate) ncols: usize,
    pub(crate) row_cluster: Arc<Cluster>,
    pub(crate) col_cluster: Arc<Cluster>,
    pub(crate) block: Block,
}

/// Structure statistics reported by [`HMatrix::info`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HMatrixInfo {
    /// Number of dense leaf blocks.
    pub dense_blocks: usize,
    /// Number of low-rank leaf blocks.
    pub low_rank_blocks: usize,
    /// Depth of the block tree; a single leaf has depth 1.
    pub depth: usize,
    /// Stored scalars divided by the scalar count of the full dense matrix.
    pub compression: f64,
}

impl HMatrix {
    /// Wraps an explicitly stored block as a dense leaf.
    ///
    /// Fails if the matrix dimensions disagree with the cluster sizes or if
    /// either dimension is zero.
    pub fn dense(
        mat: Mat<f64>,
        row_cluster: Arc<Cluster>,
        col_cluster: Arc<Cluster>,
    ) -> Result<Self, HMatrixError> {
        if mat.nrows() == 0 || mat.ncols() == 0 {
            return Err(HMatrixErrorKind::Invariant("empty dense block".to_string()).into());
        }
        if mat.nrows() != row_cluster.len() || mat.ncols() != col_cluster.len() {
            return Err(HMatrixErrorKind::Invariant(format!(
                "dense block is {}x{} but its clusters span {}x{}",
                mat.nrows(),
                mat.ncols(),
                row_cluster.len(),
                col_cluster.len()
            ))
            .into());
        }
        Ok(Self {
            nrows: mat.nrows(),
            ncols: mat.ncols(),
            row_cluster,
            col_cluster,
            block: Block::Dense { mat, pivots: None },
        })
    }

    /// Wraps the outer product `left · rightᵀ` as a low-rank leaf.
    ///
    /// Both factors must have the same number of columns; zero columns are
    /// legal and represent the zero matrix.
    pub fn low_rank(
        left: Mat<f64>,
        right: Mat<f64>,
        row_cluster: Arc<Cluster>,
        col_cluster: Arc<Cluster>,
    ) -> Result<Self, HMatrixError> {
        if left.nrows() == 0 || right.nrows() == 0 {
            return Err(HMatrixErrorKind::Invariant("empty low-rank block".to_string()).into());
        }
        if left.ncols() != right.ncols() {
            return Err(HMatrixErrorKind::Invariant(format!(
                "low-rank factors have mismatched ranks {} and {}",
                left.ncols(),
                right.ncols()
            ))
            .into());
        }
        if left.nrows() != row_cluster.len() || right.nrows() != col_cluster.len() {
            return Err(HMatrixErrorKind::Invariant(format!(
                "low-rank block is {}x{} but its clusters span {}x{}",
                left.nrows(),
                right.nrows(),
                row_cluster.len(),
                col_cluster.len()
            ))
            .into());
        }
        Ok(Self {
            nrows: left.nrows(),
            ncols: right.nrows(),
            row_cluster,
            col_cluster,
            block: Block::LowRank { left, right },
        })
    }

    /// The zero matrix over the given clusters, stored as a rank-0 low-rank
    /// leaf.
    pub fn zero(
        row_cluster: Arc<Cluster>,
        col_cluster: Arc<Cluster>,
    ) -> Result<Self, HMatrixError> {
        let left = Mat::zeros(row_cluster.len(), 0);
        let right = Mat::zeros(col_cluster.len(), 0);
        Self::low_rank(left, right, row_cluster, col_cluster)
    }

    /// Assembles four children into a hierarchical node, `children[row][col]`.
    ///
    /// The child splits must match the cluster splits exactly: row sizes
    /// `(children[0][0].nrows, children[1][0].nrows)` must equal the row
    /// cluster's child sizes, and analogously for columns. All four children
    /// must agree on the splits.
    pub fn hierarchical(
        children: [[HMatrix; 2]; 2],
        row_cluster: Arc<Cluster>,
        col_cluster: Arc<Cluster>,
    ) -> Result<Self, HMatrixError> {
        let (m1, m2) = row_cluster.split().ok_or_else(|| {
            HMatrixError::from(HMatrixErrorKind::Invariant(
                "hierarchical node requires a branch row cluster".to_string(),
            ))
        })?;
        let (n1, n2) = col_cluster.split().ok_or_else(|| {
            HMatrixError::from(HMatrixErrorKind::Invariant(
                "hierarchical node requires a branch column cluster".to_string(),
            ))
        })?;
        let rows_ok = children[0][0].nrows == m1
            && children[0][1].nrows == m1
            && children[1][0].nrows == m2
            && children[1][1].nrows == m2;
        let cols_ok = children[0][0].ncols == n1
            && children[1][0].ncols == n1
            && children[0][1].ncols == n2
            && children[1][1].ncols == n2;
        if !rows_ok || !cols_ok {
            return Err(HMatrixErrorKind::Invariant(format!(
                "child blocks do not tile the {}x{} parent at split ({}, {})",
                m1 + m2,
                n1 + n2,
                m1,
                n1
            ))
            .into());
        }
        Ok(Self {
            nrows: m1 + m2,
            ncols: n1 + n2,
            row_cluster,
            col_cluster,
            block: Block::Hierarchical {
                children: Box::new(children),
            },
        })
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// `(rows, columns)` of the represented matrix.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// The row cluster identifying this block's row index range.
    #[inline]
    pub fn row_cluster(&self) -> &Arc<Cluster> {
        &self.row_cluster
    }

    /// The column cluster identifying this block's column index range.
    #[inline]
    pub fn col_cluster(&self) -> &Arc<Cluster> {
        &self.col_cluster
    }

    /// `true` for a dense leaf.
    #[inline]
    pub fn is_dense(&self) -> bool {
        matches!(self.block, Block::Dense { .. })
    }

    /// `true` for a low-rank leaf.
    #[inline]
    pub fn is_low_rank(&self) -> bool {
        matches!(self.block, Block::LowRank { .. })
    }

    /// `true` for a hierarchical node.
    #[inline]
    pub fn is_hierarchical(&self) -> bool {
        matches!(self.block, Block::Hierarchical { .. })
    }

    /// The rank bound of a low-rank leaf, `None` for the other variants.
    #[inline]
    pub fn rank(&self) -> Option<usize> {
        match &self.block {
            Block::LowRank { left, .. } => Some(left.ncols()),
            _ => None,
        }
    }

    /// The child block at `(i, j)` of a hierarchical node, `None` for
    /// leaves or indices outside the 2×2 partition.
    pub fn child(&self, i: usize, j: usize) -> Option<&HMatrix> {
        match &self.block {
            Block::Hierarchical { children } if i < 2 && j < 2 => Some(&children[i][j]),
            _ => None,
        }
    }

    /// Structure statistics: leaf counts, depth, and compression ratio.
    pub fn info(&self) -> HMatrixInfo {
        fn walk(h: &HMatrix, info: &mut HMatrixInfo, depth: usize) -> usize {
            info.depth = info.depth.max(depth);
            match &h.block {
                Block::Dense { mat, .. } => {
                    info.dense_blocks += 1;
                    mat.nrows() * mat.ncols()
                }
                Block::LowRank { left, right } => {
                    info.low_rank_blocks += 1;
                    left.ncols() * (left.nrows() + right.nrows())
                }
                Block::Hierarchical { children } => children
                    .iter()
                    .flat_map(|row| row.iter())
                    .map(|c| walk(c, info, depth + 1))
                    .sum(),
            }
        }
        let mut info = HMatrixInfo {
            dense_blocks: 0,
            low_rank_blocks: 0,
            depth: 0,
            compression: 0.0,
        };
        let stored = walk(self, &mut info, 1);
        info.compression = stored as f64 / (self.nrows * self.ncols) as f64;
        info
    }

    /// Materializes the represented matrix as a dense [`Mat`].
    ///
    /// For an LU-factorized matrix this materializes the packed factors
    /// (the pivot vectors are not applied).
    pub fn to_dense(&self) -> Mat<f64> {
        match &self.block {
            Block::Dense { mat, .. } => mat.clone(),
            Block::LowRank { left, right } => {
                if left.ncols() == 0 {
                    Mat::zeros(self.nrows, self.ncols)
                } else {
                    left.as_ref() * right.transpose()
                }
            }
            Block::Hierarchical { children } => {
                let m1 = children[0][0].nrows;
                let n1 = children[0][0].ncols;
                let mut out = Mat::zeros(self.nrows, self.ncols);
                for (i, row) in children.iter().enumerate() {
                    for (j, child) in row.iter().enumerate() {
                        let ro = if i == 0 { 0 } else { m1 };
                        let co = if j == 0 { 0 } else { n1 };
                        out.as_mut()
                            .submatrix_mut(ro, co, child.nrows, child.ncols)
                            .copy_from(child.to_dense());
                    }
                }
                out
            }
        }
    }

    /// Collapses the node into a dense leaf holding [`Self::to_dense`].
    ///
    /// Intended for unfactored matrices: pivot vectors held by descendants
    /// are discarded.
    pub fn densify_in_place(&mut self) {
        if let Block::Dense { .. } = self.block {
            return;
        }
        let mat = self.to_dense();
        self.block = Block::Dense { mat, pivots: None };
    }

    /// Transposes the represented matrix in place: dense blocks are
    /// transposed, low-rank factors are swapped, hierarchical children are
    /// transposed recursively with the anti-diagonal pair exchanged.
    pub fn transpose_in_place(&mut self) {
        std::mem::swap(&mut self.nrows, &mut self.ncols);
        std::mem::swap(&mut self.row_cluster, &mut self.col_cluster);
        match &mut self.block {
            Block::Dense { mat, .. } => {
                *mat = mat.transpose().to_owned();
            }
            Block::LowRank { left, right } => {
                std::mem::swap(left, right);
            }
            Block::Hierarchical { children } => {
                let [top, bottom] = &mut **children;
                for child in top.iter_mut().chain(bottom.iter_mut()) {
                    child.transpose_in_place();
                }
                std::mem::swap(&mut top[1], &mut bottom[0]);
            }
        }
    }

    /// Returns the transpose as a new H-matrix.
    pub fn transposed(&self) -> HMatrix {
        let mut t = self.clone();
        t.transpose_in_place();
        t
    }

    /// Computes `self · v` into a freshly allocated matrix. `v` may have any
    /// number of columns; a vector is the single-column case.
    ///
    /// # Panics
    ///
    /// Panics if `v.nrows()` does not match the number of columns of `self`.
    pub fn matvec(&self, v: MatRef<'_, f64>) -> Mat<f64> {
        let mut r = Mat::zeros(self.nrows, v.ncols());
        self.matvec_acc(r.as_mut(), v, 1.0);
        r
    }

    /// Accumulates `r ← r + s · self · v` recursively.
    ///
    /// Dense leaves issue a single GEMM; low-rank leaves issue two, going
    /// through the short side of the factorization; hierarchical nodes slice
    /// `r` and `v` at the child split and recurse with the same scalar.
    ///
    /// # Panics
    ///
    /// Panics on dimension mismatch between `r`, `self`, and `v`.
    pub fn matvec_acc(&self, r: MatMut<'_, f64>, v: MatRef<'_, f64>, s: f64) {
        assert_eq!(
            self.ncols,
            v.nrows(),
            "Dimension mismatch: operator has {} columns but the input has {} rows.",
            self.ncols,
            v.nrows(),
        );
        assert_eq!(
            self.nrows,
            r.nrows(),
            "Dimension mismatch: operator has {} rows but the output has {} rows.",
            self.nrows,
            r.nrows(),
        );
        assert_eq!(r.ncols(), v.ncols());
        let mut r = r;
        match &self.block {
            Block::Dense { mat, .. } => {
                kernels::gemm(r, Accum::Add, mat.as_ref(), v, s);
            }
            Block::LowRank { left, right } => {
                if left.ncols() == 0 {
                    return;
                }
                // t = s · Bᵀ v is the only temporary the product allocates.
                let mut t = Mat::zeros(left.ncols(), v.ncols());
                kernels::gemm(t.as_mut(), Accum::Replace, right.transpose(), v, s);
                kernels::gemm(r, Accum::Add, left.as_ref(), t.as_ref(), 1.0);
            }
            Block::Hierarchical { children } => {
                let m1 = children[0][0].nrows;
                let n1 = children[0][0].ncols;
                let (m, n) = (self.nrows, self.ncols);
                children[0][0].matvec_acc(r.rb_mut().subrows_mut(0, m1), v.subrows(0, n1), s);
                children[0][1].matvec_acc(
                    r.rb_mut().subrows_mut(0, m1),
                    v.subrows(n1, n - n1),
                    s,
                );
                children[1][0].matvec_acc(
                    r.rb_mut().subrows_mut(m1, m - m1),
                    v.subrows(0, n1),
                    s,
                );
                children[1][1].matvec_acc(
                    r.rb_mut().subrows_mut(m1, m - m1),
                    v.subrows(n1, n - n1),
                    s,
                );
            }
        }
    }
}
