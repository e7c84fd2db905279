//! This module defines the custom error types for the library.
//!
//! All failure modes of the H-matrix engine are centralized in a single
//! enum, [`HMatrixErrorKind`], wrapped by the public [`HMatrixError`] type.
//! Every error is fatal to the operation that raised it; the engine never
//! retries or falls back internally.
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types
//! with minimal boilerplate. Note that [`faer::linalg::svd::SvdError`] does
//! not implement the standard [`std::error::Error`] trait, so we wrap it
//! manually to provide a compatible error type.
use thiserror::Error;

/// Represents all possible errors that can occur during H-matrix arithmetic.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct HMatrixError(#[from] pub(crate) HMatrixErrorKind);

/// Private enum containing the distinct kinds of errors.
/// This separation allows for a clean `Display` implementation via
/// [`thiserror`] while handling non-standard error types manually.
#[derive(Error, Debug)]
pub(crate) enum HMatrixErrorKind {
    /// The operand dimensions are incompatible for the requested operation.
    #[error(
        "Shape mismatch in {op}: left operand is {left_rows}x{left_cols}, right operand is {right_rows}x{right_cols}."
    )]
    ShapeMismatch {
        op: &'static str,
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    /// A triangular solve or LU factorization was asked to treat a low-rank
    /// block as a triangular factor, which has no meaning.
    #[error("{op} requires a dense or hierarchical operand, but a low-rank block was given.")]
    LowRankOperand { op: &'static str },

    /// A structural invariant of the block tree does not hold.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// A row permutation maps an index across the child split of a
    /// hierarchical block. Block LU never produces such a permutation, so
    /// encountering one means the operand was not factorized by this engine.
    #[error(
        "Row permutation crosses the block boundary: split at row {split} of a {rows}-row block."
    )]
    PermutationCrossesSplit { split: usize, rows: usize },

    /// The dense LU factorization produced a zero pivot; the block is
    /// numerically singular.
    #[error("Dense LU factorization produced a zero pivot at index {index}.")]
    ZeroPivot { index: usize },

    /// A solve was requested against a matrix that has not been factorized.
    #[error("{op} requires an LU-factorized H-matrix; call lu_in_place first.")]
    NotFactorized { op: &'static str },

    /// Wraps an error originating from [`faer`]'s singular value
    /// decomposition module.
    #[error("A numerical error occurred during the singular value decomposition: {0:?}")]
    SvdFailure(faer::linalg::svd::SvdError),
}
