//! Shared matrix aliases and the control/regular point partition

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// N observations by D features, read-only for the session.
pub type DataMatrix = Array2<f64>;

/// N×N symmetric matrix with zero diagonal.
pub type DistanceMatrix = Array2<f64>;

/// N×2 projected coordinates.
pub type Embedding = Array2<f64>;

/// One scalar per dataset row.
pub type DistortionVector = Array1<f64>;

/// Number of output dimensions produced by every projection.
pub const EMBEDDING_DIMS: usize = 2;

/// How per-row and per-pair work inside one call is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Strictly in index order on the calling thread
    Sequential,
    /// Fan out over the rayon pool (falls back to sequential without the `parallel` feature)
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        if cfg!(feature = "parallel") {
            Self::Parallel
        } else {
            Self::Sequential
        }
    }
}

impl ExecutionMode {
    pub(crate) fn is_parallel(self) -> bool {
        cfg!(feature = "parallel") && self == Self::Parallel
    }
}

/// Disjoint, complementary split of `[0, N)` into control and regular points.
///
/// Both lists are kept sorted so local (position in list) and global (row in the
/// data matrix) indices map monotonically onto each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPartition {
    n: usize,
    control: Vec<usize>,
    regular: Vec<usize>,
}

impl IndexPartition {
    /// Build a partition from the control point set; every other row is regular.
    pub fn new(n: usize, control: &[usize]) -> Result<Self> {
        let mut is_control = vec![false; n];
        for &i in control {
            if i >= n {
                return Err(Error::IndexOutOfBounds { index: i, len: n });
            }
            if is_control[i] {
                return Err(Error::InvalidPartition(format!(
                    "control point {} listed more than once",
                    i
                )));
            }
            is_control[i] = true;
        }

        let mut control: Vec<usize> = control.to_vec();
        control.sort_unstable();
        let regular = (0..n).filter(|&i| !is_control[i]).collect();

        Ok(Self {
            n,
            control,
            regular,
        })
    }

    /// Total number of rows covered.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Sorted global indices of control points.
    pub fn control(&self) -> &[usize] {
        &self.control
    }

    /// Sorted global indices of regular points.
    pub fn regular(&self) -> &[usize] {
        &self.regular
    }

    /// Membership mask over all N rows.
    pub fn control_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.n];
        for &i in &self.control {
            mask[i] = true;
        }
        mask
    }

    /// Local control point index for a global row, if it is a control point.
    pub fn control_local(&self, global: usize) -> Option<usize> {
        self.control.binary_search(&global).ok()
    }

    /// Local regular point index for a global row, if it is a regular point.
    pub fn regular_local(&self, global: usize) -> Option<usize> {
        self.regular.binary_search(&global).ok()
    }
}

/// Gather the rows at `indices` into a new matrix.
pub fn select_rows(matrix: ArrayView2<'_, f64>, indices: &[usize]) -> Array2<f64> {
    matrix.select(Axis(0), indices)
}

/// Gather the sub-matrix induced by `indices` on both axes.
pub fn select_square(matrix: ArrayView2<'_, f64>, indices: &[usize]) -> Array2<f64> {
    matrix.select(Axis(0), indices).select(Axis(1), indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn partition_is_complementary() {
        let p = IndexPartition::new(6, &[4, 1]).unwrap();
        assert_eq!(p.control(), &[1, 4]);
        assert_eq!(p.regular(), &[0, 2, 3, 5]);
        assert_eq!(p.control().len() + p.regular().len(), p.len());
        assert_eq!(p.control_local(4), Some(1));
        assert_eq!(p.regular_local(4), None);
        assert_eq!(p.regular_local(5), Some(3));
        assert_eq!(p.control_mask(), vec![false, true, false, false, true, false]);
    }

    #[test]
    fn partition_rejects_duplicates_and_out_of_range() {
        assert!(matches!(
            IndexPartition::new(3, &[0, 0]),
            Err(Error::InvalidPartition(_))
        ));
        assert!(matches!(
            IndexPartition::new(3, &[3]),
            Err(Error::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn square_selection() {
        let m = array![[0.0, 1.0, 2.0], [1.0, 0.0, 3.0], [2.0, 3.0, 0.0]];
        let sub = select_square(m.view(), &[0, 2]);
        assert_eq!(sub, array![[0.0, 2.0], [2.0, 0.0]]);
    }
}
