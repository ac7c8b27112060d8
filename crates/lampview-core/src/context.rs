//! Immutable per-session inputs shared by every component
//!
//! Built once when a session starts and handed out as `Arc<SessionContext>`.
//! Nothing in here changes afterwards: the data matrix, the control/regular
//! partition and the high-dimensional distance matrix.

use ndarray::ArrayView2;
use tracing::info;

use crate::distance::{compute_distance_matrix_with, Metric};
use crate::error::{Error, Result};
use crate::types::{select_rows, DataMatrix, DistanceMatrix, ExecutionMode, IndexPartition};

#[derive(Debug)]
pub struct SessionContext {
    data: DataMatrix,
    partition: IndexPartition,
    distances: DistanceMatrix,
    metric: Metric,
}

impl SessionContext {
    /// Validate the partition and precompute the high-D distance matrix.
    pub fn new(data: DataMatrix, control: &[usize], metric: Metric, mode: ExecutionMode) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(Error::EmptyInput("data matrix".into()));
        }
        let partition = IndexPartition::new(data.nrows(), control)?;
        if partition.control().is_empty() {
            return Err(Error::EmptyInput("control point set".into()));
        }

        let distances = compute_distance_matrix_with(data.view(), metric, mode);
        info!(
            rows = data.nrows(),
            dims = data.ncols(),
            control_points = partition.control().len(),
            "session context ready"
        );

        Ok(Self {
            data,
            partition,
            distances,
            metric,
        })
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn partition(&self) -> &IndexPartition {
        &self.partition
    }

    /// High-dimensional distances between all rows.
    pub fn distances(&self) -> ArrayView2<'_, f64> {
        self.distances.view()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of dataset rows.
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Feature rows of the control points, in local order.
    pub fn control_data(&self) -> DataMatrix {
        select_rows(self.data.view(), self.partition.control())
    }
}
