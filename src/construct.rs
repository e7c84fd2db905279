//! Assembly of an H-matrix from a dense matrix and a cluster tree.
//!
//! The engine does not decide *which* blocks are admissible — that is a
//! geometric or algebraic judgement the caller encodes in a predicate —
//! but once the decision is delegated, walking the tree, compressing the
//! admissible blocks, and recursing on the rest is mechanical and belongs
//! here.

use crate::algorithms::truncation::{self, Truncation};
use crate::cluster::Cluster;
use crate::error::{HMatrixError, HMatrixErrorKind};
use crate::hmatrix::HMatrix;
use faer::MatRef;
use std::sync::Arc;

impl HMatrix {
    /// Builds an H-matrix approximating `mat` over the given cluster pair.
    ///
    /// Blocks for which `admissible(s, t)` holds are compressed to low rank
    /// at the given truncation, whatever their size; inadmissible blocks
    /// whose row or column cluster is a leaf are stored densely; everything
    /// else recurses into the 2×2 partition dictated by the cluster
    /// children.
    pub fn from_dense_with_partition<F>(
        mat: MatRef<'_, f64>,
        row_cluster: &Arc<Cluster>,
        col_cluster: &Arc<Cluster>,
        admissible: &F,
        trunc: &Truncation,
    ) -> Result<HMatrix, HMatrixError>
    where
        F: Fn(&Cluster, &Cluster) -> bool,
    {
        if mat.nrows() != row_cluster.len() || mat.ncols() != col_cluster.len() {
            return Err(HMatrixErrorKind::Invariant(format!(
                "matrix is {}x{} but the clusters span {}x{}",
                mat.nrows(),
                mat.ncols(),
                row_cluster.len(),
                col_cluster.len()
            ))
            .into());
        }
        build(mat, row_cluster, col_cluster, admissible, trunc)
    }
}

fn build<F>(
    mat: MatRef<'_, f64>,
    s: &Arc<Cluster>,
    t: &Arc<Cluster>,
    admissible: &F,
    trunc: &Truncation,
) -> Result<HMatrix, HMatrixError>
where
    F: Fn(&Cluster, &Cluster) -> bool,
{
    if admissible(s.as_ref(), t.as_ref()) {
        let (left, right) = truncation::compress(mat, trunc)?;
        return HMatrix::low_rank(left, right, s.clone(), t.clone());
    }
    let (Some((sl, sr)), Some((tl, tr))) = (s.children(), t.children()) else {
        return HMatrix::dense(mat.to_owned(), s.clone(), t.clone());
    };
    let (m1, m2) = (sl.len(), sr.len());
    let (n1, n2) = (tl.len(), tr.len());
    let children = [
        [
            build(mat.submatrix(0, 0, m1, n1), sl, tl, admissible, trunc)?,
            build(mat.submatrix(0, n1, m1, n2), sl, tr, admissible, trunc)?,
        ],
        [
            build(mat.submatrix(m1, 0, m2, n1), sr, tl, admissible, trunc)?,
            build(mat.submatrix(m1, n1, m2, n2), sr, tr, admissible, trunc)?,
        ],
    ];
    HMatrix::hierarchical(children, s.clone(), t.clone())
}
