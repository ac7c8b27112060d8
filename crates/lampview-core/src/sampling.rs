//! Random control point selection

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{Error, Result};

/// `⌈√n⌉`, at least one for a non-empty dataset.
pub fn default_control_point_count(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let root = (n as f64).sqrt().ceil() as usize;
    root.clamp(1, n)
}

/// Sorted, duplicate-free random subset of `[0, n)` with `count` entries.
///
/// A fixed `seed` makes the draw reproducible; `None` seeds from the OS.
pub fn sample_control_points(n: usize, count: usize, seed: Option<u64>) -> Result<Vec<usize>> {
    if count == 0 || n == 0 {
        return Err(Error::EmptyInput("control point sample".into()));
    }
    if count > n {
        return Err(Error::IndexOutOfBounds { index: count, len: n });
    }

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut indices = rand::seq::index::sample(&mut rng, n, count).into_vec();
    indices.sort_unstable();
    debug!(n, count, "sampled control points");
    Ok(indices)
}
