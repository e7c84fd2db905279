//! # Hierarchical-Matrix Arithmetic
//!
//! A data-sparse representation of dense matrices as a recursive 2×2 block
//! partition in which far-field blocks are compressed to low rank and
//! near-field blocks stay dense, together with the block algebra that makes
//! the representation useful: addition, multiplication, triangular solves,
//! block LU factorization with pivot propagation, and matrix–vector
//! products — all recursing through the same block tree and preserving its
//! structure.
//!
//! The block structure is dictated by an externally built cluster tree
//! (see [`Cluster`]); dense numerical work is delegated to [`faer`]. The
//! engine itself is single-threaded and synchronous: every operation either
//! returns a result or fails with an [`HMatrixError`].

// Declare the modules that form the public API of the crate.
pub mod algorithms;
pub mod cluster;
pub mod error;
pub mod hmatrix;

mod construct;
mod kernels;

// Re-export key types to the top level of the crate for easier access.
pub use algorithms::truncation::Truncation;
pub use cluster::Cluster;
pub use error::HMatrixError;
pub use hmatrix::{HMatrix, HMatrixInfo};
