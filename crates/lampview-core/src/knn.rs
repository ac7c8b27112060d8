//! Fixed-size k-nearest-neighbor retrieval from a precomputed distance matrix
//!
//! Candidates are scanned in index order and kept in a sorted buffer of at most
//! `k` entries. A candidate is skipped when the buffer is full and its distance
//! is not strictly smaller than the current k-th best; otherwise it is inserted
//! after every entry with a smaller or equal distance. Ties therefore keep the
//! lower index first. When `k > N - 1` the result holds all `N - 1` other
//! points, sorted; it is never padded.

use ndarray::ArrayView2;

/// Neighbors of a single point, sorted ascending by distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub indices: Vec<usize>,
    pub distances: Vec<f64>,
}

impl Neighbors {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// k nearest neighbors of row `i`, excluding `i` itself.
///
/// `d` is read as an N x N matrix where N is its row count.
///
/// # Panics
///
/// Panics when `i >= N` or when `d` has fewer than N columns. The functions in
/// [`metrics`](crate::metrics) validate shapes before calling it.
pub fn knn(d: ArrayView2<'_, f64>, i: usize, k: usize) -> Neighbors {
    let n = d.nrows();
    let capacity = k.min(n.saturating_sub(1));
    let mut indices: Vec<usize> = Vec::with_capacity(capacity);
    let mut distances: Vec<f64> = Vec::with_capacity(capacity);

    if capacity == 0 {
        return Neighbors { indices, distances };
    }

    for j in 0..n {
        if j == i {
            continue;
        }
        let dist = d[[i, j]];

        if distances.len() == capacity {
            // Full: only strictly better candidates displace the k-th best
            if dist >= distances[capacity - 1] {
                continue;
            }
            distances.pop();
            indices.pop();
        }

        let slot = distances.partition_point(|&existing| existing <= dist);
        distances.insert(slot, dist);
        indices.insert(slot, j);
    }

    Neighbors { indices, distances }
}

/// k nearest neighbors of every row. Same preconditions as [`knn`].
pub fn knn_all(d: ArrayView2<'_, f64>, k: usize) -> Vec<Neighbors> {
    (0..d.nrows()).map(|i| knn(d, i, k)).collect()
}
