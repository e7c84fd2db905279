//! This module defines the cluster-tree contract consumed by the engine.
//!
//! An H-matrix derives its block structure from a binary partition of the
//! row and column index sets, the *cluster tree*. Building such a tree —
//! geometrically, algebraically, or otherwise — is the caller's business;
//! the engine only ever reads three things from a node: its size, whether
//! it is a leaf, and its two children. This observation allows for a
//! deliberately small collaborator type:
//!
//! 1. **Generality**: any partitioning strategy can drive the engine, as
//!    long as it can be expressed as a binary tree of sizes.
//! 2. **Sharing**: every H-matrix node built from a tree references the
//!    cluster nodes that bound its index range. The tree is immutable and
//!    shared through [`Arc`], so a deep H-matrix clone costs two pointer
//!    bumps per node rather than a tree copy.
//!
//! Admissibility — deciding which blocks are far enough apart to compress —
//! is likewise external: see
//! [`HMatrix::from_dense_with_partition`](crate::HMatrix::from_dense_with_partition),
//! which takes the predicate as an opaque closure.

use std::sync::Arc;

/// A node of an immutable, shared binary cluster tree.
///
/// A leaf covers a contiguous run of `len` indices; a branch covers the
/// concatenation of its two children's runs. The engine never inspects
/// index values, only sizes, so the tree stores no offsets.
#[derive(Debug)]
pub struct Cluster {
    size: usize,
    children: Option<(Arc<Cluster>, Arc<Cluster>)>,
}

impl Cluster {
    /// Creates a leaf cluster covering `size` indices.
    pub fn leaf(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            children: None,
        })
    }

    /// Creates a branch cluster from two child clusters. The branch covers
    /// the concatenation of the children's index runs.
    pub fn branch(left: Arc<Cluster>, right: Arc<Cluster>) -> Arc<Self> {
        Arc::new(Self {
            size: left.size + right.size,
            children: Some((left, right)),
        })
    }

    /// Number of indices covered by this cluster.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the cluster covers no indices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns `true` if this cluster has no children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// The left child, if this cluster is a branch.
    #[inline]
    pub fn left(&self) -> Option<&Arc<Cluster>> {
        self.children.as_ref().map(|(l, _)| l)
    }

    /// The right child, if this cluster is a branch.
    #[inline]
    pub fn right(&self) -> Option<&Arc<Cluster>> {
        self.children.as_ref().map(|(_, r)| r)
    }

    /// Both children at once, if this cluster is a branch.
    #[inline]
    pub fn children(&self) -> Option<(&Arc<Cluster>, &Arc<Cluster>)> {
        self.children.as_ref().map(|(l, r)| (l, r))
    }

    /// The sizes `(m1, m2)` of the two children, if this cluster is a branch.
    #[inline]
    pub fn split(&self) -> Option<(usize, usize)> {
        self.children.as_ref().map(|(l, r)| (l.size, r.size))
    }
}
