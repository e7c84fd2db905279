//! The rank-truncation core.
//!
//! Compressed blocks stay compressed only because every operation that can
//! grow a rank immediately truncates it again. Two primitives carry that
//! burden:
//!
//! * [`compress`] turns a dense block into truncated low-rank factors via a
//!   thin SVD.
//! * [`rounded_add`] forms `A₁B₁ᵀ + s·A₂B₂ᵀ` without ever materializing the
//!   dense sum: the concatenated factors are QR-factored, the small product
//!   of the R factors is SVD-truncated, and the truncated factors are
//!   reconstructed. The result rank is at most `k₁ + k₂` and usually far
//!   smaller.
//!
//! Both primitives share the same truncation rule: keep the leading singular
//! values with `σ_k / σ_1 > tol`, then apply the optional rank cap.

use crate::error::HMatrixError;
use crate::kernels;
use faer::{Mat, MatRef};

/// Truncation parameters threaded through every rank-changing operation.
///
/// The default tolerance is `1e-6`; no rank cap is applied unless one is
/// set. The struct is `Copy` so call sites can pass it by value or
/// reference interchangeably.
#[derive(Debug, Clone, Copy)]
pub struct Truncation {
    /// Relative tolerance: singular values with `σ_k / σ_1 ≤ tol` are
    /// discarded.
    pub tol: f64,
    /// Optional hard cap on the retained rank.
    pub max_rank: Option<usize>,
}

impl Default for Truncation {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            max_rank: None,
        }
    }
}

impl Truncation {
    /// Truncation at the given relative tolerance, without a rank cap.
    pub fn new(tol: f64) -> Self {
        Self {
            tol,
            max_rank: None,
        }
    }

    /// Sets the relative tolerance.
    #[must_use]
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Sets the maximum retained rank.
    #[must_use]
    pub fn with_max_rank(mut self, max_rank: usize) -> Self {
        self.max_rank = Some(max_rank);
        self
    }

    /// Number of leading singular values to keep: the largest `k` such that
    /// `σ_k / σ_1 > tol`, clamped by the rank cap.
    pub(crate) fn retained_rank(&self, sigma: &[f64]) -> usize {
        let Some(&s0) = sigma.first() else { return 0 };
        if s0 == 0.0 {
            return 0;
        }
        let mut k = sigma.iter().take_while(|&&s| s / s0 > self.tol).count();
        if let Some(cap) = self.max_rank {
            k = k.min(cap);
        }
        k
    }
}

/// Compresses a dense block into low-rank factors `(A, B)` with
/// `A·Bᵀ ≈ C` up to the truncation tolerance.
///
/// A numerically zero block yields rank-1 zero factors. The singular values
/// are folded into `B`, so `A` keeps the orthonormal left vectors.
pub(crate) fn compress(
    c: MatRef<'_, f64>,
    trunc: &Truncation,
) -> Result<(Mat<f64>, Mat<f64>), HMatrixError> {
    let (m, n) = c.shape();
    if c.norm_l2() == 0.0 {
        return Ok((Mat::zeros(m, 1), Mat::zeros(n, 1)));
    }
    let (u, sigma, v) = kernels::svd_thin(c)?;
    let k = trunc.retained_rank(&sigma);
    log::trace!("compress: {m}x{n} block truncated to rank {k}");
    let a = u.as_ref().subcols(0, k).to_owned();
    let b = Mat::from_fn(n, k, |i, j| v.as_ref()[(i, j)] * sigma[j]);
    Ok((a, b))
}

/// Rounded addition of two low-rank matrices:
/// returns factors of `A₁·B₁ᵀ + s·A₂·B₂ᵀ`, truncated.
///
/// Rank-0 operands short-circuit; otherwise the cost is two thin QR
/// factorizations of the concatenated factors and one `(k₁+k₂)`-sized SVD,
/// never an `m×n` intermediate.
pub(crate) fn rounded_add(
    a1: MatRef<'_, f64>,
    b1: MatRef<'_, f64>,
    a2: MatRef<'_, f64>,
    b2: MatRef<'_, f64>,
    s: f64,
    trunc: &Truncation,
) -> Result<(Mat<f64>, Mat<f64>), HMatrixError> {
    let (k1, k2) = (a1.ncols(), a2.ncols());
    if k2 == 0 {
        return Ok((a1.to_owned(), b1.to_owned()));
    }
    if k1 == 0 {
        let scaled = Mat::from_fn(a2.nrows(), k2, |i, j| s * a2[(i, j)]);
        return Ok((scaled, b2.to_owned()));
    }

    let (m, n) = (a1.nrows(), b1.nrows());
    let stacked_a = Mat::from_fn(m, k1 + k2, |i, j| {
        if j < k1 {
            a1[(i, j)]
        } else {
            s * a2[(i, j - k1)]
        }
    });
    let stacked_b = Mat::from_fn(n, k1 + k2, |i, j| {
        if j < k1 {
            b1[(i, j)]
        } else {
            b2[(i, j - k1)]
        }
    });

    let (qa, ra) = kernels::qr_thin(stacked_a.as_ref());
    let (qb, rb) = kernels::qr_thin(stacked_b.as_ref());
    let core = ra.as_ref() * rb.transpose();
    let (u, sigma, v) = kernels::svd_thin(core.as_ref())?;
    let k = trunc.retained_rank(&sigma);
    log::trace!("rounded_add: ranks {k1}+{k2} truncated to {k}");

    let a = qa.as_ref() * u.as_ref().subcols(0, k);
    let vs = Mat::from_fn(v.nrows(), k, |i, j| v.as_ref()[(i, j)] * sigma[j]);
    let b = qb.as_ref() * vs.as_ref();
    Ok((a, b))
}
