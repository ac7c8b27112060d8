//! Distortion observers
//!
//! An observer compares the fixed high-D distances with the distances of each
//! new embedding and publishes a per-point distortion vector. The first map it
//! sees becomes the baseline. Depending on [`MeasureMode`] it publishes the
//! raw measure, the difference from the previous map or the difference from
//! the baseline.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::SessionContext;
use crate::distance::{compute_distance_matrix_with, Metric};
use crate::error::{Error, Result};
use crate::events::{Publisher, SubscriptionId};
use crate::metrics::{neighborhood_preservation, stress_per_point};
use crate::types::{
    select_rows, select_square, DistanceMatrix, DistortionVector, ExecutionMode, IndexPartition, EMBEDDING_DIMS,
};

/// Signature of a user-supplied measure over (reference, projected) distances.
pub type MeasureFn = dyn Fn(ArrayView2<'_, f64>, ArrayView2<'_, f64>) -> Result<Array1<f64>> + Send + Sync;

/// Per-point measure over two distance matrices of equal shape.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionMeasure {
    /// Fraction of k nearest neighbors kept (higher is better)
    NeighborhoodPreservation { k: usize },
    /// Row-wise normalized stress (lower is better)
    Stress,
    #[serde(skip)]
    Custom(Arc<MeasureFn>),
}

impl fmt::Debug for DistortionMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeighborhoodPreservation { k } => write!(f, "NeighborhoodPreservation {{ k: {} }}", k),
            Self::Stress => write!(f, "Stress"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Default for DistortionMeasure {
    fn default() -> Self {
        Self::NeighborhoodPreservation { k: 10 }
    }
}

impl DistortionMeasure {
    pub fn measure(&self, dist_a: ArrayView2<'_, f64>, dist_b: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        match self {
            Self::NeighborhoodPreservation { k } => neighborhood_preservation(dist_a, dist_b, *k),
            Self::Stress => stress_per_point(dist_a, dist_b),
            Self::Custom(f) => f(dist_a, dist_b),
        }
    }
}

/// Which baseline published vectors are relative to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureMode {
    /// Raw measure of the latest map
    Current,
    /// Latest measure minus the one before it
    #[default]
    DiffPrevious,
    /// Latest measure minus the baseline (first map)
    DiffFirst,
}

/// Rows the measure is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverScope {
    #[default]
    All,
    ControlPoints,
    RegularPoints,
    /// Arbitrary dataset rows, in any order
    Rows(Vec<usize>),
}

impl ObserverScope {
    /// Sorted dataset rows covered by the scope, `None` for every row.
    pub fn resolve(&self, partition: &IndexPartition) -> Result<Option<Vec<usize>>> {
        match self {
            Self::All => Ok(None),
            Self::ControlPoints => Ok(Some(partition.control().to_vec())),
            Self::RegularPoints => Ok(Some(partition.regular().to_vec())),
            Self::Rows(rows) => {
                let len = partition.len();
                if let Some(&index) = rows.iter().find(|&&r| r >= len) {
                    warn!(index, len, "observer scope row out of bounds");
                    return Err(Error::IndexOutOfBounds { index, len });
                }
                let mut rows = rows.clone();
                rows.sort_unstable();
                rows.dedup();
                Ok(Some(rows))
            }
        }
    }
}

/// A published distortion vector, always of length N.
#[derive(Debug, Clone, PartialEq)]
pub struct DistortionUpdate {
    pub mode: MeasureMode,
    pub values: DistortionVector,
}

pub struct DistortionObserver {
    context: Arc<SessionContext>,
    measure: DistortionMeasure,
    mode: MeasureMode,
    scope_rows: Option<Vec<usize>>,
    reference: DistanceMatrix,
    execution: ExecutionMode,
    first: Option<DistortionVector>,
    previous: Option<DistortionVector>,
    current: Option<DistortionVector>,
    updates: Publisher<DistortionUpdate>,
}

impl DistortionObserver {
    pub fn new(
        context: Arc<SessionContext>,
        measure: DistortionMeasure,
        mode: MeasureMode,
        scope: ObserverScope,
        execution: ExecutionMode,
    ) -> Result<Self> {
        let scope_rows = scope.resolve(context.partition())?;
        let reference = match &scope_rows {
            Some(rows) => select_square(context.distances(), rows),
            None => context.distances().to_owned(),
        };

        Ok(Self {
            context,
            measure,
            mode,
            scope_rows,
            reference,
            execution,
            first: None,
            previous: None,
            current: None,
            updates: Publisher::new(),
        })
    }

    pub fn mode(&self) -> MeasureMode {
        self.mode
    }

    pub fn measure_kind(&self) -> &DistortionMeasure {
        &self.measure
    }

    /// Raw measure of the latest map, if any.
    pub fn current(&self) -> Option<&DistortionVector> {
        self.current.as_ref()
    }

    /// Raw measure of the first map, if any.
    pub fn baseline(&self) -> Option<&DistortionVector> {
        self.first.as_ref()
    }

    pub fn on_update<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&DistortionUpdate) + Send + 'static,
    {
        self.updates.subscribe(callback)
    }

    /// Measure a new embedding and publish according to the current mode.
    ///
    /// Returns the published update, or `None` when the mode has nothing to
    /// report yet (a diff mode on the very first map).
    pub fn set_map(&mut self, y: ArrayView2<'_, f64>) -> Result<Option<DistortionUpdate>> {
        let values = self.prepare(y)?;
        Ok(self.commit(values))
    }

    /// Measure `y` without recording it. The result has length N.
    pub fn prepare(&self, y: ArrayView2<'_, f64>) -> Result<DistortionVector> {
        let n = self.context.len();
        if y.dim() != (n, EMBEDDING_DIMS) {
            warn!(rows = y.nrows(), cols = y.ncols(), "observer rejected map with wrong shape");
            return Err(Error::shape(
                "embedding",
                format!("{}x{}", n, EMBEDDING_DIMS),
                format!("{}x{}", y.nrows(), y.ncols()),
            ));
        }
        self.measure_map(y)
            .inspect_err(|e| warn!(measure = ?self.measure, error = %e, "distortion measure failed"))
    }

    /// Record values from [`prepare`](Self::prepare) as the latest map.
    pub(crate) fn commit(&mut self, values: DistortionVector) -> Option<DistortionUpdate> {
        self.previous = self.current.take();
        if self.first.is_none() {
            self.first = Some(values.clone());
        }
        self.current = Some(values);
        debug!(mode = ?self.mode, measure = ?self.measure, "observer measured new map");
        self.emit()
    }

    /// Switch baseline and republish. `DiffPrevious` needs two recorded maps.
    pub fn set_measure_mode(&mut self, mode: MeasureMode) -> Result<Option<DistortionUpdate>> {
        if mode == MeasureMode::DiffPrevious && self.previous.is_none() {
            warn!("DiffPrevious requested before a previous map exists");
            return Err(Error::NoPreviousMap);
        }
        self.mode = mode;
        Ok(self.emit())
    }

    fn measure_map(&self, y: ArrayView2<'_, f64>) -> Result<DistortionVector> {
        let metric = Metric::Euclidean;
        match &self.scope_rows {
            None => {
                let projected = compute_distance_matrix_with(y, metric, self.execution);
                let values = self.measure.measure(self.reference.view(), projected.view())?;
                check_measure_len(values.len(), self.context.len())?;
                Ok(values)
            }
            Some(rows) => {
                let scoped = select_rows(y, rows);
                let projected = compute_distance_matrix_with(scoped.view(), metric, self.execution);
                let local = self.measure.measure(self.reference.view(), projected.view())?;
                check_measure_len(local.len(), rows.len())?;
                let mut full = Array1::zeros(self.context.len());
                for (&global, &v) in rows.iter().zip(local.iter()) {
                    full[global] = v;
                }
                Ok(full)
            }
        }
    }

    fn emit(&mut self) -> Option<DistortionUpdate> {
        let current = self.current.as_ref()?;
        let values = match self.mode {
            MeasureMode::Current => current.clone(),
            MeasureMode::DiffPrevious => current - self.previous.as_ref()?,
            MeasureMode::DiffFirst => {
                // The baseline itself is never reported as a delta
                self.previous.as_ref()?;
                current - self.first.as_ref()?
            }
        };
        let update = DistortionUpdate {
            mode: self.mode,
            values,
        };
        self.updates.publish(&update);
        Some(update)
    }
}

fn check_measure_len(actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::shape("distortion vector", expected, actual));
    }
    Ok(())
}
