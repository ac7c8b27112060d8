//! Force Scheme placement
//!
//! Iteratively moves points so their 2D distances approach a target distance
//! matrix. Each iteration visits every ordered pair `(i, j)`, `i != j`, with
//! the outer and inner index orders shuffled independently, and pushes `Y_j`
//! along `Y_j - Y_i` by a fraction of the distance error.
//!
//! Updates within an iteration depend on each other, so this always runs on
//! the calling thread. Results are deterministic for a fixed seed.

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Embedding, EMBEDDING_DIMS};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceSchemeConfig {
    /// Hard cap on iterations
    pub max_iter: usize,
    /// Stop once the total movement changes by less than this between iterations
    pub tol: f64,
    /// Each move corrects `1 / fraction` of the pair's distance error
    pub fraction: f64,
    /// Floor on current 2D distances
    pub epsilon: f64,
    /// RNG seed for the initial layout and visiting orders; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for ForceSchemeConfig {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tol: 0.0,
            fraction: 8.0,
            epsilon: 1e-7,
            seed: None,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceSchemeReport {
    pub iterations: usize,
    pub delta_sum: f64,
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Run from a uniform random layout in the unit square.
pub fn force_scheme(d: ArrayView2<'_, f64>, config: &ForceSchemeConfig) -> Result<Embedding> {
    let mut rng = rng_from(config.seed);
    let mut y = Array2::from_shape_simple_fn((d.nrows(), EMBEDDING_DIMS), || rng.gen::<f64>());
    force_scheme_in_place(d, &mut y, config, &mut rng)?;
    Ok(y)
}

/// Refine a caller-owned layout.
pub fn force_scheme_from(
    d: ArrayView2<'_, f64>,
    y: &mut Embedding,
    config: &ForceSchemeConfig,
) -> Result<ForceSchemeReport> {
    let mut rng = rng_from(config.seed);
    force_scheme_in_place(d, y, config, &mut rng)
}

fn force_scheme_in_place(
    d: ArrayView2<'_, f64>,
    y: &mut Embedding,
    config: &ForceSchemeConfig,
    rng: &mut StdRng,
) -> Result<ForceSchemeReport> {
    let n = d.nrows();
    if d.ncols() != n {
        return Err(Error::shape("target distance matrix", format!("{}x{}", n, n), format!("{}x{}", n, d.ncols())));
    }
    if y.dim() != (n, EMBEDDING_DIMS) {
        return Err(Error::shape(
            "initial embedding",
            format!("{}x{}", n, EMBEDDING_DIMS),
            format!("{}x{}", y.nrows(), y.ncols()),
        ));
    }

    let mut outer: Vec<usize> = (0..n).collect();
    let mut inner: Vec<usize> = (0..n).collect();
    let mut prev_delta_sum = f64::INFINITY;
    let mut delta_sum = 0.0;
    let mut iterations = 0;

    for _ in 0..config.max_iter {
        iterations += 1;
        delta_sum = 0.0;
        outer.shuffle(rng);
        inner.shuffle(rng);

        for &i in &outer {
            for &j in &inner {
                if i == j {
                    continue;
                }
                let dx = y[[j, 0]] - y[[i, 0]];
                let dy = y[[j, 1]] - y[[i, 1]];
                let dist = (dx * dx + dy * dy).sqrt().max(config.epsilon);
                let delta = (d[[i, j]] - dist) / config.fraction;
                delta_sum += delta.abs();
                y[[j, 0]] += delta * dx / dist;
                y[[j, 1]] += delta * dy / dist;
            }
        }

        if (prev_delta_sum - delta_sum).abs() < config.tol {
            break;
        }
        prev_delta_sum = delta_sum;
    }

    debug!(iterations, delta_sum, points = n, "force scheme finished");
    Ok(ForceSchemeReport {
        iterations,
        delta_sum,
    })
}
