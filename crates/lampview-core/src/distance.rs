//! Pairwise distance matrices over the rows of a data matrix
//!
//! Only the strict lower triangle is computed; each cell is mirrored into the
//! upper triangle and the diagonal stays zero. Rows are independent, so with
//! the `parallel` feature they are distributed over the rayon pool and joined
//! before the matrix is assembled.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::types::{DistanceMatrix, ExecutionMode};

/// Distance function between two row vectors.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// L2 norm of the difference
    #[default]
    Euclidean,
    /// Squared L2 norm, as consumed by t-SNE bandwidth search and LAMP weights
    SquaredEuclidean,
    /// L1 norm of the difference
    Manhattan,
    /// 1 - cosine similarity; 1.0 when either vector has zero magnitude
    Cosine,
    /// Caller-supplied function
    #[serde(skip)]
    Custom(fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64),
}

impl Metric {
    pub fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Euclidean => squared_euclidean(a, b).sqrt(),
            Self::SquaredEuclidean => squared_euclidean(a, b),
            Self::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            Self::Cosine => (1.0 - cosine_similarity(a, b)).max(0.0),
            Self::Custom(f) => f(a, b),
        }
    }
}

/// Squared L2 norm of `a - b`.
pub fn squared_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn cosine_similarity(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

/// Euclidean distance matrix using the default execution mode.
pub fn compute_distance_matrix(x: ArrayView2<'_, f64>) -> DistanceMatrix {
    compute_distance_matrix_with(x, Metric::Euclidean, ExecutionMode::default())
}

/// Distance matrix for an arbitrary metric and execution mode.
pub fn compute_distance_matrix_with(
    x: ArrayView2<'_, f64>,
    metric: Metric,
    mode: ExecutionMode,
) -> DistanceMatrix {
    let n = x.nrows();
    let lower = lower_triangle(x, metric, mode);

    let mut d = Array2::zeros((n, n));
    for (i, row) in lower.into_iter().enumerate() {
        for (j, value) in row.into_iter().enumerate() {
            d[[i, j]] = value;
            d[[j, i]] = value;
        }
    }
    d
}

/// Row `i` holds the distances to rows `0..i`.
fn lower_triangle(x: ArrayView2<'_, f64>, metric: Metric, mode: ExecutionMode) -> Vec<Vec<f64>> {
    let row = |i: usize| -> Vec<f64> {
        let xi = x.row(i);
        (0..i).map(|j| metric.distance(xi, x.row(j))).collect()
    };

    #[cfg(feature = "parallel")]
    if mode.is_parallel() {
        return (0..x.nrows()).into_par_iter().map(row).collect();
    }

    let _ = mode;
    (0..x.nrows()).map(row).collect()
}
