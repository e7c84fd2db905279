//! Integration test suite for the H-matrix engine.
//!
//! # Test Methodology
//!
//! Every compressed operation in this crate has an exact dense counterpart,
//! and that is what the suite leans on: each property is validated by
//! materializing the operands with `to_dense`, performing the reference
//! computation with ordinary dense arithmetic, and asserting that the
//! H-matrix result matches up to a tolerance proportional to the truncation
//! tolerance in use.
//!
//! The suite covers, in order:
//!
//! 1. Literal end-to-end scenarios with hand-checkable values (identities,
//!    rank-1 outer products, block identities).
//! 2. Quantified properties on reproducibly random problems: matvec,
//!    addition, multiplication, LU reconstruction, and solve accuracy,
//!    plus the structural invariants (conversion round trip, transpose
//!    symmetry, rank monotonicity, pivot composition).
//!
//! Random inputs use a fixed [`StdRng`] seed so failures are reproducible.
//! Diagonally dominant test matrices keep the dense LU pivoting benign,
//! so solve accuracy reflects truncation error rather than conditioning.

use anyhow::{ensure, Result};
use faer::{mat, Mat};
use hmatrix::{Cluster, HMatrix, Truncation};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

/// Tolerance multiplier for truncated operations: results are compared
/// against dense references at `10 × tol`, matching the accuracy the
/// rounded arithmetic is designed to deliver.
const TOL_FACTOR: f64 = 10.0;

/// A balanced binary cluster tree over `n` indices with leaves of size
/// `leaf`.
fn balanced_tree(n: usize, leaf: usize) -> Arc<Cluster> {
    if n <= leaf {
        Cluster::leaf(n)
    } else {
        let half = n / 2;
        Cluster::branch(balanced_tree(half, leaf), balanced_tree(n - half, leaf))
    }
}

/// Weak admissibility: every off-diagonal (distinct-cluster) block is
/// compressed.
fn weakly_admissible(s: &Cluster, t: &Cluster) -> bool {
    !std::ptr::eq(s, t)
}

/// A reproducible random matrix with entries in `[0, 1)`.
fn random_mat(rng: &mut StdRng, m: usize, n: usize) -> Mat<f64> {
    Mat::from_fn(m, n, |_, _| rng.random())
}

/// A diagonally dominant matrix whose off-diagonal blocks have rank at most
/// two: `shift·I + P·Qᵀ` with `P, Q` of width two.
fn dominant_rank2_matrix(rng: &mut StdRng, n: usize, shift: f64) -> Mat<f64> {
    let p = random_mat(rng, n, 2);
    let q = random_mat(rng, n, 2);
    let outer = p.as_ref() * q.transpose();
    Mat::from_fn(n, n, |i, j| {
        if i == j {
            shift + outer.as_ref()[(i, j)]
        } else {
            outer.as_ref()[(i, j)]
        }
    })
}

fn rel_err(got: &Mat<f64>, expected: &Mat<f64>) -> f64 {
    (got - expected).norm_l2() / expected.norm_l2()
}

// --- End-to-end scenarios ---

#[test]
fn scenario_dense_identity_leaf() -> Result<()> {
    let s = Cluster::leaf(4);
    let mut h = HMatrix::dense(Mat::identity(4, 4), s.clone(), s)?;

    let info = h.info();
    ensure!(info.dense_blocks == 1);
    ensure!(info.low_rank_blocks == 0);
    ensure!(info.depth == 1);
    ensure!(info.compression == 1.0);

    let v = mat![[1.0], [2.0], [3.0], [4.0]];
    ensure!(h.matvec(v.as_ref()) == v, "identity matvec must be exact");

    h.lu_in_place(&Truncation::default())?;
    ensure!(h.to_dense() == Mat::identity(4, 4));
    ensure!(h.pivots()? == vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn scenario_rank_one_outer_product() -> Result<()> {
    let s = Cluster::leaf(4);
    let a = mat![[1.0], [1.0], [1.0], [1.0]];
    let b = mat![[1.0], [2.0], [3.0], [4.0]];
    let h = HMatrix::low_rank(a, b, s.clone(), s)?;

    let d = h.to_dense();
    for i in 0..4 {
        for j in 0..4 {
            ensure!(d.as_ref()[(i, j)] == (j + 1) as f64);
        }
    }

    let e1 = mat![[1.0], [0.0], [0.0], [0.0]];
    ensure!(h.matvec(e1.as_ref()) == mat![[1.0], [1.0], [1.0], [1.0]]);
    Ok(())
}

#[test]
fn scenario_block_identity_lu() -> Result<()> {
    let s = Cluster::branch(Cluster::leaf(2), Cluster::leaf(2));
    let (sl, sr) = s.children().unwrap();
    let children = [
        [
            HMatrix::dense(Mat::identity(2, 2), sl.clone(), sl.clone())?,
            HMatrix::zero(sl.clone(), sr.clone())?,
        ],
        [
            HMatrix::zero(sr.clone(), sl.clone())?,
            HMatrix::dense(Mat::identity(2, 2), sr.clone(), sr.clone())?,
        ],
    ];
    let mut h = HMatrix::hierarchical(children, s.clone(), s)?;
    h.lu_in_place(&Truncation::default())?;
    ensure!(h.pivots()? == vec![0, 1, 2, 3]);
    ensure!(h.to_dense() == Mat::identity(4, 4));
    Ok(())
}

#[test]
fn scenario_low_rank_absorbs_dense_update() -> Result<()> {
    let s = Cluster::leaf(4);
    let mut h = HMatrix::low_rank(
        mat![[1.0], [1.0], [1.0], [1.0]],
        mat![[1.0], [2.0], [3.0], [4.0]],
        s.clone(),
        s.clone(),
    )?;
    // A rank-2 dense update; the sum has rank 3.
    let p = mat![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0], [0.0, 0.0]];
    let d = p.as_ref() * p.transpose();
    let expected = {
        let base = h.to_dense();
        &base + &d
    };
    let update = HMatrix::dense(d, s.clone(), s)?;
    h.add_assign_scaled(&update, 1.0, &Truncation::new(1e-10))?;
    ensure!(h.is_low_rank(), "format of the target must be preserved");
    ensure!(h.rank() == Some(3));
    ensure!(rel_err(&h.to_dense(), &expected) < 1e-9);
    Ok(())
}

#[test]
fn scenario_two_level_product() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let tree = balanced_tree(8, 4);
    let tol = 1e-6;
    let trunc = Truncation::new(tol);

    let m1 = random_mat(&mut rng, 8, 8);
    let m2 = random_mat(&mut rng, 8, 8);
    let h1 =
        HMatrix::from_dense_with_partition(m1.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let h2 =
        HMatrix::from_dense_with_partition(m2.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;

    let product = h1.matmul(&h2, &trunc)?;
    let expected = h1.to_dense().as_ref() * h2.to_dense().as_ref();
    ensure!(
        rel_err(&product.to_dense(), &expected) < TOL_FACTOR * tol,
        "hierarchical product deviates from the dense reference"
    );
    Ok(())
}

#[test]
fn scenario_lu_solve_two_level() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    // Two levels: dense 4x4 diagonal blocks, low-rank 4x4 off-diagonal.
    let tree = balanced_tree(8, 4);
    let trunc = Truncation::new(1e-10);

    let a = dominant_rank2_matrix(&mut rng, 8, 10.0);
    let mut h =
        HMatrix::from_dense_with_partition(a.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    // Off-diagonal blocks of shift·I + P·Qᵀ have rank at most two.
    for block_rank in collect_low_rank_ranks(&h) {
        ensure!(block_rank <= 2);
    }
    let a_before = h.to_dense();

    h.lu_in_place(&trunc)?;

    let x_true = random_mat(&mut rng, 8, 1);
    let b = a_before.as_ref() * x_true.as_ref();
    let x = h.solve(b.as_ref())?;
    ensure!(
        rel_err(&x, &x_true) < 1e-8,
        "solve error exceeds what the truncation tolerance allows"
    );
    Ok(())
}

/// Collects the ranks of every low-rank leaf in the block tree.
fn collect_low_rank_ranks(h: &HMatrix) -> Vec<usize> {
    fn walk(h: &HMatrix, out: &mut Vec<usize>) {
        if let Some(k) = h.rank() {
            out.push(k);
        }
        for i in 0..2 {
            for j in 0..2 {
                if let Some(child) = h.child(i, j) {
                    walk(child, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(h, &mut out);
    out
}

// --- Quantified properties ---

#[test]
fn property_conversion_round_trip() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let tree = balanced_tree(8, 2);
    let m = random_mat(&mut rng, 8, 8);
    let h = HMatrix::from_dense_with_partition(
        m.as_ref(),
        &tree,
        &tree,
        &weakly_admissible,
        &Truncation::default(),
    )?;
    let copy = h.clone();
    ensure!(copy.to_dense() == h.to_dense(), "deep copy must be exact");
    Ok(())
}

#[test]
fn property_matvec_matches_dense() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(2);
    let tree = balanced_tree(16, 4);
    let tol = 1e-6;
    let m = random_mat(&mut rng, 16, 16);
    let h = HMatrix::from_dense_with_partition(
        m.as_ref(),
        &tree,
        &tree,
        &weakly_admissible,
        &Truncation::new(tol),
    )?;
    let v = random_mat(&mut rng, 16, 1);
    let reference = h.to_dense().as_ref() * v.as_ref();
    let got = h.matvec(v.as_ref());
    ensure!(rel_err(&got, &reference) < tol);
    Ok(())
}

#[test]
fn property_matvec_accumulates_with_scalar() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let tree = balanced_tree(8, 2);
    let m = random_mat(&mut rng, 8, 8);
    let h = HMatrix::from_dense_with_partition(
        m.as_ref(),
        &tree,
        &tree,
        &weakly_admissible,
        &Truncation::new(1e-10),
    )?;
    let v = random_mat(&mut rng, 8, 1);
    let mut r = random_mat(&mut rng, 8, 1);
    let expected = {
        let scaled = faer::Scale(-0.5) * &(h.to_dense().as_ref() * v.as_ref());
        &r + &scaled
    };
    h.matvec_acc(r.as_mut(), v.as_ref(), -0.5);
    ensure!(rel_err(&r, &expected) < 1e-9);
    Ok(())
}

#[test]
fn property_addition_matches_dense() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(4);
    let tree = balanced_tree(8, 2);
    let tol = 1e-8;
    let trunc = Truncation::new(tol);
    let m1 = random_mat(&mut rng, 8, 8);
    let m2 = random_mat(&mut rng, 8, 8);
    let mut h1 =
        HMatrix::from_dense_with_partition(m1.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let h2 =
        HMatrix::from_dense_with_partition(m2.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let s = -1.5;
    let expected = {
        let scaled = faer::Scale(s) * &h2.to_dense();
        &h1.to_dense() + &scaled
    };
    h1.add_assign_scaled(&h2, s, &trunc)?;
    ensure!(rel_err(&h1.to_dense(), &expected) < TOL_FACTOR * tol);
    Ok(())
}

#[test]
fn property_multiplication_matches_dense() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let tree = balanced_tree(16, 4);
    let tol = 1e-8;
    let trunc = Truncation::new(tol);
    let m1 = random_mat(&mut rng, 16, 16);
    let m2 = random_mat(&mut rng, 16, 16);
    let h1 =
        HMatrix::from_dense_with_partition(m1.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let h2 =
        HMatrix::from_dense_with_partition(m2.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let product = h1.matmul(&h2, &trunc)?;
    let expected = h1.to_dense().as_ref() * h2.to_dense().as_ref();
    ensure!(rel_err(&product.to_dense(), &expected) < TOL_FACTOR * tol);
    Ok(())
}

#[test]
fn property_lu_reconstruction() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(6);
    let tree = balanced_tree(8, 2);
    let tol = 1e-10;
    let trunc = Truncation::new(tol);
    let a = dominant_rank2_matrix(&mut rng, 8, 8.0);
    let mut h =
        HMatrix::from_dense_with_partition(a.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let a_before = h.to_dense();

    h.lu_in_place(&trunc)?;
    let p = h.pivots()?;
    let packed = h.to_dense();
    let n = packed.nrows();

    // Split the packed factors into unit-lower L and upper U.
    let l = Mat::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else if i > j {
            packed.as_ref()[(i, j)]
        } else {
            0.0
        }
    });
    let u = Mat::from_fn(n, n, |i, j| if i <= j { packed.as_ref()[(i, j)] } else { 0.0 });
    let permuted_a = Mat::from_fn(n, n, |i, j| a_before.as_ref()[(p[i], j)]);
    let lu = l.as_ref() * u.as_ref();
    ensure!(
        rel_err(&lu, &permuted_a) < TOL_FACTOR * tol,
        "P·A must match L·U up to truncation"
    );
    Ok(())
}

#[test]
fn property_solve_accuracy() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(8);
    let tree = balanced_tree(16, 4);
    let trunc = Truncation::new(1e-10);
    let a = dominant_rank2_matrix(&mut rng, 16, 12.0);
    let mut h =
        HMatrix::from_dense_with_partition(a.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let a_before = h.to_dense();
    h.lu_in_place(&trunc)?;

    let x_true = random_mat(&mut rng, 16, 2);
    let b = a_before.as_ref() * x_true.as_ref();
    let x = h.solve(b.as_ref())?;
    ensure!(rel_err(&x, &x_true) < 1e-8);
    Ok(())
}

#[test]
fn property_pivot_composition_stays_within_halves() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(9);
    let tree = balanced_tree(8, 2);
    let trunc = Truncation::new(1e-10);
    let a = dominant_rank2_matrix(&mut rng, 8, 6.0);
    let mut h =
        HMatrix::from_dense_with_partition(a.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    h.lu_in_place(&trunc)?;

    let p = h.pivots()?;
    let m1 = 4; // split of the balanced 8-index tree
    ensure!(p[..m1].iter().all(|&i| i < m1));
    ensure!(p[m1..].iter().all(|&i| i >= m1));
    // 0-based form of the invariant: the lower half, rebased, is a
    // permutation of 0..(m − m1).
    let max_rebased = p[m1..].iter().map(|&i| i - m1).max().unwrap();
    ensure!(max_rebased == p.len() - m1 - 1);
    Ok(())
}

#[test]
fn property_lu_solve_with_genuine_pivoting() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(12);
    let tree = balanced_tree(8, 2);
    let trunc = Truncation::new(1e-10);
    // Diagonal leaves are anti-diagonally dominant, so every dense leaf
    // factorization must swap rows.
    let a = Mat::from_fn(8, 8, |i, j| {
        let block = (i / 2, j / 2);
        if block.0 == block.1 {
            if i % 2 != j % 2 { 5.0 + (i + j) as f64 } else { 0.1 * (1 + i) as f64 }
        } else {
            0.05 * rng.random::<f64>()
        }
    });
    let mut h =
        HMatrix::from_dense_with_partition(a.as_ref(), &tree, &tree, &weakly_admissible, &trunc)?;
    let a_before = h.to_dense();
    h.lu_in_place(&trunc)?;

    let p = h.pivots()?;
    ensure!(p != (0..8).collect::<Vec<_>>(), "pivoting must actually occur");

    let x_true = random_mat(&mut rng, 8, 1);
    let b = a_before.as_ref() * x_true.as_ref();
    let x = h.solve(b.as_ref())?;
    ensure!(rel_err(&x, &x_true) < 1e-7);
    Ok(())
}

#[test]
fn property_rank_monotone_after_rounded_add() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(10);
    let s = Cluster::leaf(16);
    let tol = 1e-9;
    let (k1, k2) = (3, 2);
    let mut h1 = HMatrix::low_rank(
        random_mat(&mut rng, 16, k1),
        random_mat(&mut rng, 16, k1),
        s.clone(),
        s.clone(),
    )?;
    let h2 = HMatrix::low_rank(
        random_mat(&mut rng, 16, k2),
        random_mat(&mut rng, 16, k2),
        s.clone(),
        s,
    )?;
    let expected = {
        let scaled = faer::Scale(2.0) * &h2.to_dense();
        &h1.to_dense() + &scaled
    };
    h1.add_assign_scaled(&h2, 2.0, &Truncation::new(tol))?;
    let k = h1.rank().unwrap();
    ensure!(k <= k1 + k2, "rounded addition must not grow past k1 + k2");
    ensure!(rel_err(&h1.to_dense(), &expected) < TOL_FACTOR * tol);
    Ok(())
}

#[test]
fn property_transpose_symmetry() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let tree = balanced_tree(8, 2);
    let m = random_mat(&mut rng, 8, 8);
    let h = HMatrix::from_dense_with_partition(
        m.as_ref(),
        &tree,
        &tree,
        &weakly_admissible,
        &Truncation::default(),
    )?;
    let t = h.transposed();
    // Dense and hierarchical blocks transpose by copying, so this is exact;
    // low-rank blocks swap factors, which only reorders the products inside
    // each dot product of the materialization.
    let reference = h.to_dense().transpose().to_owned();
    ensure!(rel_err(&t.to_dense(), &reference) < 1e-14);
    Ok(())
}
