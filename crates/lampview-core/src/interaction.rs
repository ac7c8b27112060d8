//! Selection translation and direct manipulation of control points
//!
//! Views show either the control points, the regular points or the whole
//! dataset, and report selections in their own (local) numbering.
//! [`SelectionHandler`] maps those back to dataset rows. [`InteractionHandler`]
//! turns drag/place gestures into a new control point layout.

use ndarray::{Array2, ArrayView2};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{IndexPartition, EMBEDDING_DIMS};

/// Local-to-global index map for one view of the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionHandler {
    index_map: Vec<usize>,
    n: usize,
}

impl SelectionHandler {
    pub fn new(index_map: Vec<usize>, n: usize) -> Result<Self> {
        if let Some(&index) = index_map.iter().find(|&&g| g >= n) {
            return Err(Error::IndexOutOfBounds { index, len: n });
        }
        Ok(Self { index_map, n })
    }

    pub fn identity(n: usize) -> Self {
        Self {
            index_map: (0..n).collect(),
            n,
        }
    }

    pub fn for_control_points(partition: &IndexPartition) -> Self {
        Self {
            index_map: partition.control().to_vec(),
            n: partition.len(),
        }
    }

    pub fn for_regular_points(partition: &IndexPartition) -> Self {
        Self {
            index_map: partition.regular().to_vec(),
            n: partition.len(),
        }
    }

    /// Number of items in the view.
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    /// Number of dataset rows.
    pub fn dataset_len(&self) -> usize {
        self.n
    }

    /// Sorted, deduplicated dataset rows for local indices.
    pub fn translate(&self, local: &[usize]) -> Result<Vec<usize>> {
        let mut global = local
            .iter()
            .map(|&l| {
                self.index_map.get(l).copied().ok_or(Error::IndexOutOfBounds {
                    index: l,
                    len: self.index_map.len(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        global.sort_unstable();
        global.dedup();
        Ok(global)
    }

    /// Local indices of the `true` entries of a per-item mask.
    pub fn mask_to_local(&self, mask: &[bool]) -> Result<Vec<usize>> {
        if mask.len() != self.index_map.len() {
            warn!(expected = self.index_map.len(), len = mask.len(), "selection mask has wrong size");
            return Err(Error::shape("selection mask", self.index_map.len(), mask.len()));
        }
        Ok(mask
            .iter()
            .enumerate()
            .filter(|&(_, &m)| m)
            .map(|(i, _)| i)
            .collect())
    }

    /// Length-N mask with the translated selection set.
    pub fn to_global_mask(&self, local: &[usize]) -> Result<Vec<bool>> {
        let mut mask = vec![false; self.n];
        for g in self.translate(local)? {
            mask[g] = true;
        }
        Ok(mask)
    }

    /// Local index of a dataset row, if it belongs to this view.
    pub fn to_local(&self, global: usize) -> Option<usize> {
        self.index_map.iter().position(|&g| g == global)
    }
}

/// Editable copy of the control point positions.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionHandler {
    positions: Array2<f64>,
}

impl InteractionHandler {
    pub fn new(positions: Array2<f64>) -> Result<Self> {
        if positions.ncols() != EMBEDDING_DIMS {
            return Err(Error::shape("control point positions", EMBEDDING_DIMS, positions.ncols()));
        }
        Ok(Self { positions })
    }

    pub fn positions(&self) -> ArrayView2<'_, f64> {
        self.positions.view()
    }

    /// Replace the positions after the controller accepted a layout.
    pub fn sync(&mut self, positions: ArrayView2<'_, f64>) -> Result<()> {
        if positions.dim() != self.positions.dim() {
            return Err(Error::shape(
                "control point positions",
                format!("{}x{}", self.positions.nrows(), EMBEDDING_DIMS),
                format!("{}x{}", positions.nrows(), positions.ncols()),
            ));
        }
        self.positions.assign(&positions);
        Ok(())
    }

    /// Layout with one control point moved to `(x, y)`.
    pub fn place(&self, local: usize, x: f64, y: f64) -> Result<Array2<f64>> {
        self.check(&[local])?;
        let mut ys = self.positions.clone();
        ys[[local, 0]] = x;
        ys[[local, 1]] = y;
        Ok(ys)
    }

    /// Layout with every selected control point shifted by `(dx, dy)`.
    pub fn move_selected(&self, local: &[usize], dx: f64, dy: f64) -> Result<Array2<f64>> {
        self.check(local)?;
        let mut ys = self.positions.clone();
        let mut moved = vec![false; ys.nrows()];
        for &l in local {
            // Duplicates move once
            if std::mem::replace(&mut moved[l], true) {
                continue;
            }
            ys[[l, 0]] += dx;
            ys[[l, 1]] += dy;
        }
        debug!(count = local.len(), dx, dy, "moved control points");
        Ok(ys)
    }

    fn check(&self, local: &[usize]) -> Result<()> {
        let len = self.positions.nrows();
        match local.iter().find(|&&l| l >= len) {
            Some(&index) => {
                warn!(index, len, "control point index out of range");
                Err(Error::IndexOutOfBounds { index, len })
            }
            None => Ok(()),
        }
    }
}
