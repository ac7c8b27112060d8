//! Distortion metrics between a reference (high-D) and a projected (low-D) space

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};
use crate::knn::knn;

fn check_same_square(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<()> {
    if a.nrows() != a.ncols() {
        return Err(Error::shape("distance matrix", "square", format!("{}x{}", a.nrows(), a.ncols())));
    }
    if a.dim() != b.dim() {
        return Err(Error::shape(
            "paired distance matrices",
            format!("{}x{}", a.nrows(), a.ncols()),
            format!("{}x{}", b.nrows(), b.ncols()),
        ));
    }
    Ok(())
}

/// Fraction of each point's k nearest neighbors shared between two spaces.
///
/// `k` is clamped to `N - 1`. Comparing a matrix with itself yields 1 everywhere.
pub fn neighborhood_preservation(
    dist_a: ArrayView2<'_, f64>,
    dist_b: ArrayView2<'_, f64>,
    k: usize,
) -> Result<Array1<f64>> {
    check_same_square(dist_a, dist_b)?;
    let n = dist_a.nrows();
    let k = k.min(n.saturating_sub(1));
    if k == 0 {
        return Ok(Array1::ones(n));
    }

    let mut in_a = vec![false; n];
    let values = (0..n)
        .map(|i| {
            let na = knn(dist_a, i, k);
            let nb = knn(dist_b, i, k);
            for &j in &na.indices {
                in_a[j] = true;
            }
            let shared = nb.indices.iter().filter(|&&j| in_a[j]).count();
            for &j in &na.indices {
                in_a[j] = false;
            }
            shared as f64 / k as f64
        })
        .collect();
    Ok(values)
}

/// Normalized stress: `Σ_{i<j} (Dp_ij - Dq_ij)² / Dp_ij` over `Σ_{i<j} Dp_ij`.
///
/// Every off-diagonal reference distance must be positive.
pub fn stress(dp: ArrayView2<'_, f64>, dq: ArrayView2<'_, f64>) -> Result<f64> {
    check_same_square(dp, dq)?;
    let n = dp.nrows();
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let reference = dp[[i, j]];
            if reference <= 0.0 {
                return Err(Error::ZeroDistance { i, j });
            }
            let diff = reference - dq[[i, j]];
            num += diff * diff / reference;
            den += reference;
        }
    }
    if den == 0.0 {
        return Ok(0.0);
    }
    Ok(num / den)
}

/// Row-wise normalized stress. Pairs with zero reference distance are skipped.
pub fn stress_per_point(dp: ArrayView2<'_, f64>, dq: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    check_same_square(dp, dq)?;
    let n = dp.nrows();
    let values = (0..n)
        .map(|i| {
            let mut num = 0.0;
            let mut den = 0.0;
            for j in 0..n {
                let reference = dp[[i, j]];
                if j == i || reference <= 0.0 {
                    continue;
                }
                let diff = reference - dq[[i, j]];
                num += diff * diff / reference;
                den += reference;
            }
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        })
        .collect();
    Ok(values)
}

/// Row-wise Kullback-Leibler divergence `Σ_j P_ij log(P_ij / Q_ij)`.
///
/// Entries with `P_ij <= 0` contribute nothing; `Q` is floored to avoid division by zero.
pub fn kl_divergence(p: ArrayView2<'_, f64>, q: ArrayView2<'_, f64>) -> Array1<f64> {
    p.rows()
        .into_iter()
        .zip(q.rows())
        .map(|(prow, qrow)| row_kl(prow, qrow))
        .collect()
}

fn row_kl(p: ArrayView1<'_, f64>, q: ArrayView1<'_, f64>) -> f64 {
    p.iter()
        .zip(q.iter())
        .filter(|&(&pi, _)| pi > 0.0)
        .map(|(&pi, &qi)| pi * (pi / qi.max(f64::MIN_POSITIVE)).ln())
        .sum()
}

/// Row-stochastic probabilities from squared distances and squared bandwidths.
///
/// `P_ij = exp(-D_ij / sigma_i) / Σ_{k≠i} exp(-D_ik / sigma_i)`. The diagonal is
/// excluded from the normalizer and set to 1, so a self term contributes
/// `1 · log(1 / 1) = 0` to [`kl_divergence`].
pub fn d2p(d: ArrayView2<'_, f64>, sigmas: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
    let n = d.nrows();
    if d.ncols() != n {
        return Err(Error::shape("distance matrix", "square", format!("{}x{}", n, d.ncols())));
    }
    if sigmas.len() != n {
        return Err(Error::shape("bandwidth vector", n, sigmas.len()));
    }

    let mut p = Array2::zeros((n, n));
    for i in 0..n {
        let sigma = sigmas[i];
        // Shift by the row minimum so the largest term is exp(0)
        let shift = (0..n)
            .filter(|&j| j != i)
            .map(|j| d[[i, j]])
            .fold(f64::INFINITY, f64::min);
        let mut sum = 0.0;
        for j in 0..n {
            if j == i {
                continue;
            }
            let v = (-(d[[i, j]] - shift) / sigma).exp();
            p[[i, j]] = v;
            sum += v;
        }
        if sum > 0.0 {
            for j in 0..n {
                if j != i {
                    p[[i, j]] /= sum;
                }
            }
        }
        p[[i, i]] = 1.0;
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{compute_distance_matrix, compute_distance_matrix_with, Metric};
    use crate::types::ExecutionMode;
    use ndarray::{array, Array2};

    fn sample() -> Array2<f64> {
        Array2::from_shape_fn((12, 3), |(i, j)| ((i * 7 + j * 5) % 13) as f64 * 0.5 + i as f64 * 0.01)
    }

    #[test]
    fn self_preservation_is_one_for_all_k() {
        let d = compute_distance_matrix(sample().view());
        for k in 1..12 {
            let np = neighborhood_preservation(d.view(), d.view(), k).unwrap();
            assert!(np.iter().all(|&v| v == 1.0), "k = {}", k);
        }
    }

    #[test]
    fn preservation_detects_swapped_neighbors() {
        let a = compute_distance_matrix(array![[0.0], [1.0], [5.0], [6.0]].view());
        let b = compute_distance_matrix(array![[0.0], [10.0], [5.0], [6.0]].view());
        let np = neighborhood_preservation(a.view(), b.view(), 1).unwrap();
        // Point 0 loses neighbor 1 to 2; point 3 keeps 2
        assert_eq!(np[0], 0.0);
        assert_eq!(np[3], 1.0);
    }

    #[test]
    fn stress_zero_for_identical_and_positive_otherwise() {
        let d = compute_distance_matrix(sample().view());
        assert_eq!(stress(d.view(), d.view()).unwrap(), 0.0);

        let scaled = &d * 1.5;
        assert!(stress(d.view(), scaled.view()).unwrap() > 0.0);
    }

    #[test]
    fn stress_rejects_zero_reference_distance() {
        let d = compute_distance_matrix(array![[0.0, 0.0], [0.0, 0.0], [1.0, 1.0]].view());
        assert!(matches!(
            stress(d.view(), d.view()),
            Err(Error::ZeroDistance { i: 0, j: 1 })
        ));
        // The per-point variant skips the degenerate pair
        let per_point = stress_per_point(d.view(), d.view()).unwrap();
        assert!(per_point.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn d2p_rows_sum_to_one_without_diagonal() {
        let d_sq = compute_distance_matrix_with(sample().view(), Metric::SquaredEuclidean, ExecutionMode::Sequential);
        let sigmas = Array1::from_shape_fn(12, |i| 0.5 + i as f64);
        let p = d2p(d_sq.view(), sigmas.view()).unwrap();
        for i in 0..12 {
            let off_diagonal: f64 = (0..12).filter(|&j| j != i).map(|j| p[[i, j]]).sum();
            assert!((off_diagonal - 1.0).abs() < 1e-12);
            assert_eq!(p[[i, i]], 1.0);
        }
    }

    #[test]
    fn kl_of_identical_distributions_is_zero() {
        let d_sq = compute_distance_matrix_with(sample().view(), Metric::SquaredEuclidean, ExecutionMode::Sequential);
        let p = d2p(d_sq.view(), Array1::ones(12).view()).unwrap();
        let kl = kl_divergence(p.view(), p.view());
        assert!(kl.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn kl_is_positive_for_different_rows() {
        let p = array![[1.0, 0.9, 0.1], [0.5, 1.0, 0.5], [0.1, 0.9, 1.0]];
        let q = array![[1.0, 0.5, 0.5], [0.5, 1.0, 0.5], [0.5, 0.5, 1.0]];
        let kl = kl_divergence(p.view(), q.view());
        assert!(kl[0] > 0.0);
        assert!(kl[1].abs() < 1e-12);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let a = Array2::<f64>::zeros((3, 3));
        let b = Array2::<f64>::zeros((4, 4));
        assert!(neighborhood_preservation(a.view(), b.view(), 1).is_err());
        assert!(d2p(a.view(), Array1::ones(2).view()).is_err());
    }
}
