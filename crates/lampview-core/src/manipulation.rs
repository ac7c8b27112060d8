//! Control-point driven re-projection of the full dataset
//!
//! The controller keeps three snapshots: `current`, `previous` (the map right
//! before the latest edit) and `first` (the very first map of the session).
//! Every successful edit publishes the control point rows, the regular point
//! rows and the full embedding on separate channels.

use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use tracing::{debug, warn};

use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::events::{Publisher, SubscriptionId};
use crate::projection::{LampConfig, Technique};
use crate::types::{select_rows, Embedding, ExecutionMode, EMBEDDING_DIMS};

pub struct ManipulationController {
    context: Arc<SessionContext>,
    technique: Technique,
    lamp_config: LampConfig,
    execution: ExecutionMode,
    current: Option<Embedding>,
    previous: Option<Embedding>,
    first: Option<Embedding>,
    control_points: Publisher<Embedding>,
    regular_points: Publisher<Embedding>,
    embedding: Publisher<Embedding>,
    rewound: Publisher<Embedding>,
}

impl ManipulationController {
    pub fn new(context: Arc<SessionContext>, technique: Technique) -> Self {
        Self::with_config(context, technique, LampConfig::default(), ExecutionMode::default())
    }

    pub fn with_config(
        context: Arc<SessionContext>,
        technique: Technique,
        lamp_config: LampConfig,
        execution: ExecutionMode,
    ) -> Self {
        Self {
            context,
            technique,
            lamp_config,
            execution,
            current: None,
            previous: None,
            first: None,
            control_points: Publisher::new(),
            regular_points: Publisher::new(),
            embedding: Publisher::new(),
            rewound: Publisher::new(),
        }
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn set_technique(&mut self, technique: Technique) {
        self.technique = technique;
    }

    /// Re-project every row from new control point positions.
    ///
    /// On any failure the stored snapshots are left untouched.
    pub fn set_control_points(&mut self, ys: ArrayView2<'_, f64>) -> Result<&Embedding> {
        let y = self.project(ys)?;
        Ok(self.commit(y))
    }

    /// Re-project from `ys` without recording or publishing the result.
    pub fn project(&self, ys: ArrayView2<'_, f64>) -> Result<Embedding> {
        let control = self.context.partition().control();
        if ys.nrows() != control.len() || ys.ncols() != EMBEDDING_DIMS {
            warn!(
                expected_rows = control.len(),
                rows = ys.nrows(),
                cols = ys.ncols(),
                "rejected control point update with wrong shape"
            );
            return Err(Error::shape(
                "control point positions",
                format!("{}x{}", control.len(), EMBEDDING_DIMS),
                format!("{}x{}", ys.nrows(), ys.ncols()),
            ));
        }

        let y = self
            .technique
            .project(self.context.data(), control, ys, &self.lamp_config, self.execution)
            .inspect_err(|e| warn!(technique = %self.technique, error = %e, "re-projection failed"))?;
        debug!(technique = %self.technique, rows = y.nrows(), "re-projected dataset");
        Ok(y)
    }

    /// Record a map produced by [`project`](Self::project) as the latest edit.
    pub(crate) fn commit(&mut self, y: Embedding) -> &Embedding {
        self.previous = self.current.take();
        if self.first.is_none() {
            self.first = Some(y.clone());
        }
        self.publish(&y);
        self.current.insert(y)
    }

    /// Blend `t·current + (1 − t)·previous` without changing any snapshot.
    ///
    /// `t` is clamped to `[0, 1]`. Fails when there is no previous map.
    pub fn rewind(&mut self, t: f64) -> Result<Embedding> {
        let (current, previous) = match (&self.current, &self.previous) {
            (Some(c), Some(p)) => (c, p),
            _ => {
                warn!("rewind requested without a previous map");
                return Err(Error::NoPreviousMap);
            }
        };
        let t = t.clamp(0.0, 1.0);
        let view = current * t + previous * (1.0 - t);
        self.rewound.publish(&view);
        Ok(view)
    }

    /// Adopt an embedding chosen elsewhere (undo/reset) as the current one.
    ///
    /// The previous snapshot is dropped, matching the history it came from.
    pub fn sync_to(&mut self, y: Embedding) -> Result<()> {
        if y.dim() != (self.context.len(), EMBEDDING_DIMS) {
            return Err(Error::shape(
                "embedding",
                format!("{}x{}", self.context.len(), EMBEDDING_DIMS),
                format!("{}x{}", y.nrows(), y.ncols()),
            ));
        }
        self.publish(&y);
        self.current = Some(y);
        self.previous = None;
        Ok(())
    }

    fn publish(&mut self, y: &Embedding) {
        let partition = self.context.partition();
        self.control_points.publish(&select_rows(y.view(), partition.control()));
        self.regular_points.publish(&select_rows(y.view(), partition.regular()));
        self.embedding.publish(y);
    }

    pub fn current(&self) -> Option<&Embedding> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Embedding> {
        self.previous.as_ref()
    }

    pub fn first(&self) -> Option<&Embedding> {
        self.first.as_ref()
    }

    /// Control point rows of the current map, in local order.
    pub fn control_positions(&self) -> Option<Array2<f64>> {
        self.current
            .as_ref()
            .map(|y| select_rows(y.view(), self.context.partition().control()))
    }

    pub fn on_control_points<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Embedding) + Send + 'static,
    {
        self.control_points.subscribe(callback)
    }

    pub fn on_regular_points<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Embedding) + Send + 'static,
    {
        self.regular_points.subscribe(callback)
    }

    pub fn on_embedding<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Embedding) + Send + 'static,
    {
        self.embedding.subscribe(callback)
    }

    pub fn on_rewind<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Embedding) + Send + 'static,
    {
        self.rewound.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Metric;
    use ndarray::array;
    use parking_lot::Mutex;

    fn context() -> Arc<SessionContext> {
        let data = Array2::from_shape_fn((8, 3), |(i, j)| ((i * 3 + j * 5) % 7) as f64 + i as f64 * 0.1);
        Arc::new(SessionContext::new(data, &[1, 4, 6], Metric::Euclidean, ExecutionMode::Sequential).unwrap())
    }

    fn ys(scale: f64) -> Array2<f64> {
        array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]] * scale
    }

    #[test]
    fn snapshots_follow_edits() {
        let mut c = ManipulationController::new(context(), Technique::Lamp);
        assert!(c.current().is_none());

        let a = c.set_control_points(ys(1.0).view()).unwrap().clone();
        assert!(c.previous().is_none());
        assert_eq!(c.first(), Some(&a));

        let b = c.set_control_points(ys(2.0).view()).unwrap().clone();
        assert_eq!(c.previous(), Some(&a));
        assert_eq!(c.current(), Some(&b));
        assert_eq!(c.first(), Some(&a));
        assert_eq!(c.control_positions().unwrap(), ys(2.0));
    }

    #[test]
    fn publishes_three_views() {
        let mut c = ManipulationController::new(context(), Technique::Lamp);
        let shapes = Arc::new(Mutex::new(Vec::new()));
        for tag in ["cp", "rp", "full"] {
            let s = shapes.clone();
            let cb = move |y: &Embedding| s.lock().push((tag, y.nrows()));
            match tag {
                "cp" => c.on_control_points(cb),
                "rp" => c.on_regular_points(cb),
                _ => c.on_embedding(cb),
            };
        }

        c.set_control_points(ys(1.0).view()).unwrap();
        assert_eq!(*shapes.lock(), vec![("cp", 3), ("rp", 5), ("full", 8)]);
    }

    #[test]
    fn wrong_shape_leaves_state_unchanged() {
        let mut c = ManipulationController::new(context(), Technique::Lamp);
        let a = c.set_control_points(ys(1.0).view()).unwrap().clone();

        let bad = array![[0.0, 0.0], [1.0, 1.0]];
        assert!(c.set_control_points(bad.view()).is_err());
        assert_eq!(c.current(), Some(&a));
        assert!(c.previous().is_none());
    }

    #[test]
    fn singular_plmp_leaves_state_unchanged() {
        let mut c = ManipulationController::new(context(), Technique::Lamp);
        let a = c.set_control_points(ys(1.0).view()).unwrap().clone();

        // Three control points cannot determine a map from 3 features
        c.set_technique(Technique::Plmp);
        assert!(matches!(
            c.set_control_points(ys(2.0).view()),
            Err(Error::SingularSystem)
        ));
        assert_eq!(c.current(), Some(&a));
    }

    #[test]
    fn project_does_not_record() {
        let mut c = ManipulationController::new(context(), Technique::Lamp);
        let published = Arc::new(Mutex::new(0));
        let p = published.clone();
        c.on_embedding(move |_| *p.lock() += 1);

        let y = c.project(ys(1.0).view()).unwrap();
        assert_eq!(y.dim(), (8, 2));
        assert!(c.current().is_none());
        assert_eq!(*published.lock(), 0);

        assert_eq!(c.set_control_points(ys(1.0).view()).unwrap(), &y);
        assert_eq!(*published.lock(), 1);
    }

    #[test]
    fn rewind_blends_without_mutating() {
        let mut c = ManipulationController::new(context(), Technique::Lamp);
        c.set_control_points(ys(1.0).view()).unwrap();
        assert!(matches!(c.rewind(0.5), Err(Error::NoPreviousMap)));

        c.set_control_points(ys(3.0).view()).unwrap();
        let current = c.current().unwrap().clone();
        let previous = c.previous().unwrap().clone();

        assert_eq!(c.rewind(1.0).unwrap(), current);
        assert_eq!(c.rewind(0.0).unwrap(), previous);
        let half = c.rewind(0.5).unwrap();
        let expected = (&current + &previous) * 0.5;
        for (a, b) in half.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(c.current(), Some(&current));
    }
}
