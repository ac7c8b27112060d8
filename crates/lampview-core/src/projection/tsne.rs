//! t-distributed Stochastic Neighbor Embedding
//!
//! Exact O(N²) gradient descent: per-point bandwidths are found by bisection
//! to match the target perplexity, the joint probabilities are symmetrized and
//! exaggerated for the early iterations, and the embedding is updated with
//! momentum and adaptive per-coordinate gains.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::distance::{compute_distance_matrix_with, Metric};
use crate::metrics::kl_divergence;
use crate::types::{Embedding, ExecutionMode, EMBEDDING_DIMS};

/// Floor applied to every probability and kernel value.
pub const MIN_PROBABILITY: f64 = 1e-12;

/// Scale of the Gaussian initial layout.
const INITIAL_SPREAD: f64 = 1e-4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TsneConfig {
    pub perplexity: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub initial_momentum: f64,
    pub final_momentum: f64,
    /// Iteration at which momentum switches from initial to final
    pub momentum_switch_iter: usize,
    /// Multiplier on P during the early iterations
    pub exaggeration: f64,
    /// Iteration at which the exaggeration is removed
    pub stop_exaggeration_iter: usize,
    pub min_gain: f64,
    /// Accepted |H - log(perplexity)| in the bandwidth search
    pub perplexity_tol: f64,
    pub max_bandwidth_tries: usize,
    pub seed: Option<u64>,
    pub execution: ExecutionMode,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            max_iter: 1000,
            learning_rate: 500.0,
            initial_momentum: 0.5,
            final_momentum: 0.8,
            momentum_switch_iter: 20,
            exaggeration: 4.0,
            stop_exaggeration_iter: 100,
            min_gain: 0.01,
            perplexity_tol: 1e-5,
            max_bandwidth_tries: 50,
            seed: None,
            execution: ExecutionMode::default(),
        }
    }
}

/// Entropy and normalized conditional probabilities of one row at precision `beta`.
///
/// `d_sq` holds squared distances to every other point (self excluded).
pub fn h_beta(d_sq: ArrayView1<'_, f64>, beta: f64) -> (f64, Array1<f64>) {
    let mut p = d_sq.mapv(|d| (-d * beta).exp());
    let sum_p = p.sum().max(MIN_PROBABILITY);
    let weighted: f64 = d_sq.iter().zip(p.iter()).map(|(d, p)| d * p).sum();
    let h = sum_p.ln() + beta * weighted / sum_p;
    p /= sum_p;
    (h, p)
}

/// Conditional probabilities P(j|i) from squared distances, one bisection per row.
///
/// Returns the N×N matrix (zero diagonal) and the precision found for each row.
pub fn calc_p(
    d_sq: ArrayView2<'_, f64>,
    perplexity: f64,
    tol: f64,
    max_tries: usize,
    mode: ExecutionMode,
) -> (Array2<f64>, Vec<f64>) {
    let n = d_sq.nrows();
    let log_u = perplexity.ln();

    let row = |i: usize| -> (Array1<f64>, f64) {
        let others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
        let di = d_sq.row(i).select(Axis(0), &others);
        let (p, beta) = bandwidth_search(di.view(), log_u, tol, max_tries);
        let mut full = Array1::zeros(n);
        for (&j, &v) in others.iter().zip(p.iter()) {
            full[j] = v;
        }
        (full, beta)
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<(Array1<f64>, f64)> = if mode.is_parallel() {
        (0..n).into_par_iter().map(row).collect()
    } else {
        (0..n).map(row).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<(Array1<f64>, f64)> = {
        let _ = mode;
        (0..n).map(row).collect()
    };

    let mut p = Array2::zeros((n, n));
    let mut betas = Vec::with_capacity(n);
    for (i, (prow, beta)) in rows.into_iter().enumerate() {
        p.row_mut(i).assign(&prow);
        betas.push(beta);
    }
    (p, betas)
}

fn bandwidth_search(d_sq: ArrayView1<'_, f64>, log_u: f64, tol: f64, max_tries: usize) -> (Array1<f64>, f64) {
    let mut beta = 1.0;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let (mut h, mut p) = h_beta(d_sq, beta);
    let mut h_diff = h - log_u;
    let mut tries = 0;

    while h_diff.abs() > tol && tries < max_tries {
        if h_diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
        (h, p) = h_beta(d_sq, beta);
        h_diff = h - log_u;
        tries += 1;
    }

    (p, beta)
}

/// Embed the rows of `x` in 2D.
///
/// Never fails: degenerate inputs (zero or one row) yield a zero layout.
pub fn tsne(x: ArrayView2<'_, f64>, config: &TsneConfig) -> Embedding {
    let n = x.nrows();
    if n < 2 {
        return Array2::zeros((n, EMBEDDING_DIMS));
    }

    let mode = config.execution;
    let d_sq = compute_distance_matrix_with(x, Metric::SquaredEuclidean, mode);
    let (conditional, _) = calc_p(
        d_sq.view(),
        config.perplexity,
        config.perplexity_tol,
        config.max_bandwidth_tries,
        mode,
    );

    let mut p = &conditional + &conditional.t();
    let total = p.sum().max(MIN_PROBABILITY);
    scale_probabilities(&mut p, config.exaggeration / total);

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut y = Array2::from_shape_simple_fn((n, EMBEDDING_DIMS), || {
        rng.sample::<f64, _>(StandardNormal) * INITIAL_SPREAD
    });
    let mut velocity = Array2::<f64>::zeros((n, EMBEDDING_DIMS));
    let mut gains = Array2::<f64>::ones((n, EMBEDDING_DIMS));

    for iter in 0..config.max_iter {
        let (num, q) = student_t_kernel(y.view());
        let grad = gradient(p.view(), q.view(), num.view(), y.view(), mode);

        let momentum = if iter < config.momentum_switch_iter {
            config.initial_momentum
        } else {
            config.final_momentum
        };

        for ((g, v), gain) in grad.iter().zip(velocity.iter_mut()).zip(gains.iter_mut()) {
            *gain = if (*g > 0.0) != (*v > 0.0) {
                *gain + 0.2
            } else {
                *gain * 0.8
            };
            *gain = gain.max(config.min_gain);
            *v = momentum * *v - config.learning_rate * *gain * g;
        }
        y += &velocity;

        if let Some(mean) = y.mean_axis(Axis(0)) {
            y -= &mean;
        }

        if (iter + 1) % 100 == 0 {
            let cost: f64 = kl_divergence(p.view(), q.view()).sum();
            debug!(iteration = iter + 1, cost, "t-SNE progress");
        }

        if iter + 1 == config.stop_exaggeration_iter {
            scale_probabilities(&mut p, 1.0 / config.exaggeration);
        }
    }

    y
}

/// Unnormalized Student-t kernel (zero diagonal) and its normalized, floored form.
/// Multiply every joint probability by `factor`, keeping the floor.
fn scale_probabilities(p: &mut Array2<f64>, factor: f64) {
    p.mapv_inplace(|v| (v * factor).max(MIN_PROBABILITY));
}

fn student_t_kernel(y: ArrayView2<'_, f64>) -> (Array2<f64>, Array2<f64>) {
    let n = y.nrows();
    let mut num = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = y[[i, 0]] - y[[j, 0]];
            let dy = y[[i, 1]] - y[[j, 1]];
            let k = 1.0 / (1.0 + dx * dx + dy * dy);
            num[[i, j]] = k;
            num[[j, i]] = k;
        }
    }
    let total = num.sum().max(MIN_PROBABILITY);
    let q = num.mapv(|v| (v / total).max(MIN_PROBABILITY));
    (num, q)
}

fn gradient(
    p: ArrayView2<'_, f64>,
    q: ArrayView2<'_, f64>,
    num: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    mode: ExecutionMode,
) -> Array2<f64> {
    let n = y.nrows();
    let point = |i: usize| -> [f64; 2] {
        let mut g = [0.0; 2];
        for j in 0..n {
            let w = (p[[i, j]] - q[[i, j]]) * num[[i, j]];
            g[0] += w * (y[[i, 0]] - y[[j, 0]]);
            g[1] += w * (y[[i, 1]] - y[[j, 1]]);
        }
        g
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<[f64; 2]> = if mode.is_parallel() {
        (0..n).into_par_iter().map(point).collect()
    } else {
        (0..n).map(point).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<[f64; 2]> = {
        let _ = mode;
        (0..n).map(point).collect()
    };

    let mut grad = Array2::zeros((n, EMBEDDING_DIMS));
    for (i, g) in rows.into_iter().enumerate() {
        grad[[i, 0]] = g[0];
        grad[[i, 1]] = g[1];
    }
    grad
}
