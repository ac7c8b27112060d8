//! One interactive projection session
//!
//! `Session` owns the shared [`SessionContext`] and every stateful component,
//! and routes each edit through them in a fixed order:
//!
//! ```text
//! set_control_points(Ys)
//!   -> ManipulationController   (re-project, publish cp / rp / full)
//!   -> ProjectionHistory        (add_map)
//!   -> DistortionObservers      (set_map, publish per observer)
//!   -> EffectivenessEnforcer    (delta of the designated observer)
//!   -> InteractionHandler       (sync control point positions)
//! ```
//!
//! `undo` and `reset` start at the history instead and push the restored map
//! through the same chain. Every fallible step (projection, each observer's
//! measure) runs before any component records the new map, so a failed call
//! leaves the whole session as it was.

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::SessionContext;
use crate::distance::Metric;
use crate::effectiveness::EffectivenessInteractionEnforcer;
use crate::error::{Error, Result};
use crate::history::ProjectionHistory;
use crate::interaction::{InteractionHandler, SelectionHandler};
use crate::io::{load_indices, load_matrix, save_indices, save_matrix};
use crate::manipulation::ManipulationController;
use crate::observer::{DistortionMeasure, DistortionObserver, DistortionUpdate, MeasureMode, ObserverScope};
use crate::projection::{force_scheme, ForceSchemeConfig, LampConfig, Technique};
use crate::sampling::{default_control_point_count, sample_control_points};
use crate::types::{select_rows, select_square, DataMatrix, DistortionVector, Embedding, ExecutionMode};

/// File holding the control point positions, one `x y` row per control point.
pub const CP_EMBEDDING_FILE: &str = "cp_embedding.txt";
/// File holding the dataset rows of the control points, one per line.
pub const CP_INDICES_FILE: &str = "cp_indices.txt";

/// One distortion observer to attach to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverSpec {
    pub measure: DistortionMeasure,
    pub mode: MeasureMode,
    pub scope: ObserverScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Out-of-sample technique used on every edit
    pub technique: Technique,
    pub lamp: LampConfig,
    /// High-dimensional distance
    pub metric: Metric,
    pub execution: ExecutionMode,
    /// Initial control point layout
    pub force_scheme: ForceSchemeConfig,
    pub observers: Vec<ObserverSpec>,
    /// Index into `observers` whose deltas drive effectiveness labels
    pub effectiveness_observer: Option<usize>,
    /// View whose local numbering selections are given in
    pub selection_scope: ObserverScope,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            technique: Technique::default(),
            lamp: LampConfig::default(),
            metric: Metric::default(),
            execution: ExecutionMode::default(),
            force_scheme: ForceSchemeConfig::default(),
            observers: vec![ObserverSpec::default()],
            effectiveness_observer: Some(0),
            selection_scope: ObserverScope::All,
        }
    }
}

pub struct Session {
    context: Arc<SessionContext>,
    config: SessionConfig,
    controller: ManipulationController,
    history: ProjectionHistory,
    observers: Vec<DistortionObserver>,
    enforcer: EffectivenessInteractionEnforcer,
    interaction: Option<InteractionHandler>,
}

impl Session {
    /// Build every component for `data` with the given control points.
    ///
    /// No map exists until the first [`set_control_points`](Self::set_control_points).
    pub fn new(data: DataMatrix, control: &[usize], config: SessionConfig) -> Result<Self> {
        if let Some(idx) = config.effectiveness_observer {
            if idx >= config.observers.len() {
                return Err(Error::IndexOutOfBounds {
                    index: idx,
                    len: config.observers.len(),
                });
            }
        }

        let context = Arc::new(SessionContext::new(data, control, config.metric, config.execution)?);
        let controller =
            ManipulationController::with_config(context.clone(), config.technique, config.lamp.clone(), config.execution);
        let history = ProjectionHistory::with_lamp_config(context.clone(), config.lamp.clone());
        let observers = config
            .observers
            .iter()
            .map(|spec| {
                DistortionObserver::new(
                    context.clone(),
                    spec.measure.clone(),
                    spec.mode,
                    spec.scope.clone(),
                    config.execution,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let selector = match &config.selection_scope {
            ObserverScope::All => SelectionHandler::identity(context.len()),
            ObserverScope::ControlPoints => SelectionHandler::for_control_points(context.partition()),
            ObserverScope::RegularPoints => SelectionHandler::for_regular_points(context.partition()),
            ObserverScope::Rows(rows) => SelectionHandler::new(rows.clone(), context.len())?,
        };
        let enforcer = EffectivenessInteractionEnforcer::with_selector(selector);

        Ok(Self {
            context,
            config,
            controller,
            history,
            observers,
            enforcer,
            interaction: None,
        })
    }

    /// Sample control points, lay them out with force scheme and project.
    ///
    /// `cp_count` defaults to `⌈√N⌉`. `seed` drives the sample and, unless the
    /// config carries its own, the force scheme layout.
    pub fn bootstrap(
        data: DataMatrix,
        config: SessionConfig,
        cp_count: Option<usize>,
        seed: Option<u64>,
    ) -> Result<Self> {
        let count = cp_count.unwrap_or_else(|| default_control_point_count(data.nrows()));
        let control = sample_control_points(data.nrows(), count, seed)?;
        let mut session = Self::new(data, &control, config)?;
        let ys = session.initial_layout(seed)?;
        session.set_control_points(ys.view())?;
        info!(control_points = control.len(), "session bootstrapped");
        Ok(session)
    }

    /// Force scheme layout of the control points against their high-D
    /// distances, scaled so the largest distance is 1.
    pub fn initial_layout(&self, seed: Option<u64>) -> Result<Embedding> {
        let mut target = select_square(self.context.distances(), self.context.partition().control());
        let max = target.fold(0.0_f64, |m, &v| m.max(v));
        if max > 0.0 {
            target.mapv_inplace(|v| v / max);
        }
        let mut fs = self.config.force_scheme.clone();
        fs.seed = fs.seed.or(seed);
        force_scheme(target.view(), &fs)
    }

    /// Re-project from new control point positions and update every component.
    pub fn set_control_points(&mut self, ys: ArrayView2<'_, f64>) -> Result<&Embedding> {
        let y = self.controller.project(ys)?;
        let measured = self.measure(&y)?;

        self.history.add_map(y.clone())?;
        self.controller.commit(y.clone());
        self.propagate(&y, measured)
    }

    /// Shift the selected control points (local indices) and re-project.
    pub fn move_control_points(&mut self, local: &[usize], dx: f64, dy: f64) -> Result<&Embedding> {
        let ys = self.interaction()?.move_selected(local, dx, dy)?;
        self.set_control_points(ys.view())
    }

    /// Put one control point at `(x, y)` and re-project.
    pub fn place_control_point(&mut self, local: usize, x: f64, y: f64) -> Result<&Embedding> {
        let ys = self.interaction()?.place(local, x, y)?;
        self.set_control_points(ys.view())
    }

    /// Return to the map before the latest edit.
    pub fn undo(&mut self) -> Result<&Embedding> {
        let Some(y) = self.history.previous().cloned() else {
            warn!("undo requested without a previous map");
            return Err(Error::NoPreviousMap);
        };
        let measured = self.measure(&y)?;
        self.history.undo();
        self.restore(y, measured)
    }

    /// Return to the first map of the session.
    pub fn reset(&mut self) -> Result<&Embedding> {
        let Some(y) = self.history.first().cloned() else {
            warn!("reset requested before any map");
            return Err(Error::NoMap);
        };
        let measured = self.measure(&y)?;
        self.history.reset();
        self.restore(y, measured)
    }

    /// Transient blend between the current and previous map.
    pub fn rewind(&mut self, t: f64) -> Result<Embedding> {
        self.controller.rewind(t)
    }

    /// Change the baseline of one observer and republish it.
    pub fn set_measure_mode(&mut self, observer: usize, mode: MeasureMode) -> Result<Option<DistortionUpdate>> {
        let len = self.observers.len();
        self.observers
            .get_mut(observer)
            .ok_or(Error::IndexOutOfBounds { index: observer, len })?
            .set_measure_mode(mode)
    }

    /// Selection in the numbering of the configured selection scope.
    pub fn set_selection(&mut self, local: &[usize]) -> Result<()> {
        self.enforcer.set_selection(local)
    }

    pub fn set_technique(&mut self, technique: Technique) {
        self.config.technique = technique;
        self.controller.set_technique(technique);
    }

    fn restore(&mut self, y: Embedding, measured: Vec<DistortionVector>) -> Result<&Embedding> {
        self.controller.sync_to(y.clone())?;
        self.propagate(&y, measured)
    }

    /// Run every observer's measure on `y` without recording anything.
    fn measure(&self, y: &Embedding) -> Result<Vec<DistortionVector>> {
        let measured = self
            .observers
            .iter()
            .map(|observer| observer.prepare(y.view()))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| warn!(error = %e, "map discarded, an observer could not measure it"))?;

        let designated = self.config.effectiveness_observer.and_then(|idx| measured.get(idx));
        if let Some(values) = designated {
            let n = self.enforcer.dataset_len();
            if values.len() != n {
                return Err(Error::shape("distortion delta", n, values.len()));
            }
        }
        Ok(measured)
    }

    /// Hand measured values to the observers and fan their deltas out.
    fn propagate(&mut self, y: &Embedding, measured: Vec<DistortionVector>) -> Result<&Embedding> {
        for (idx, (observer, values)) in self.observers.iter_mut().zip(measured).enumerate() {
            let update = observer.commit(values);
            if self.config.effectiveness_observer != Some(idx) {
                continue;
            }
            if let Some(update) = update.filter(|u| u.mode != MeasureMode::Current) {
                self.enforcer.set_measure_difference(update.values.view())?;
            }
        }

        let positions = select_rows(y.view(), self.context.partition().control());
        match &mut self.interaction {
            Some(handler) => handler.sync(positions.view())?,
            None => self.interaction = Some(InteractionHandler::new(positions)?),
        }
        self.current().ok_or(Error::NoMap)
    }

    fn interaction(&self) -> Result<&InteractionHandler> {
        self.interaction.as_ref().ok_or(Error::NoMap)
    }

    /// Write the control point layout and indices into `dir`.
    pub fn save_state(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let positions = self.controller.control_positions().ok_or(Error::NoMap)?;
        std::fs::create_dir_all(dir)?;
        save_matrix(dir.join(CP_EMBEDDING_FILE), positions.view())?;
        save_indices(dir.join(CP_INDICES_FILE), self.context.partition().control())?;
        info!(dir = %dir.display(), control_points = positions.nrows(), "session state saved");
        Ok(())
    }

    /// Rebuild a session from `data` and a state directory written by
    /// [`save_state`](Self::save_state), then project once.
    pub fn resume(data: DataMatrix, dir: impl AsRef<Path>, config: SessionConfig) -> Result<Self> {
        let (ys, control) = load_state(dir.as_ref())?;
        let mut session = Self::new(data, &control, config)?;

        // Rows of `ys` follow the file order; the partition keeps indices sorted
        let mut order: Vec<usize> = (0..control.len()).collect();
        order.sort_by_key(|&i| control[i]);
        let ys = select_rows(ys.view(), &order);

        session.set_control_points(ys.view())?;
        info!(dir = %dir.as_ref().display(), "session resumed");
        Ok(session)
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&Embedding> {
        self.controller.current()
    }

    pub fn control_positions(&self) -> Option<Array2<f64>> {
        self.controller.control_positions()
    }

    pub fn controller(&self) -> &ManipulationController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ManipulationController {
        &mut self.controller
    }

    pub fn history(&self) -> &ProjectionHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut ProjectionHistory {
        &mut self.history
    }

    pub fn observers(&self) -> &[DistortionObserver] {
        &self.observers
    }

    pub fn observer_mut(&mut self, idx: usize) -> Option<&mut DistortionObserver> {
        self.observers.get_mut(idx)
    }

    pub fn enforcer(&self) -> &EffectivenessInteractionEnforcer {
        &self.enforcer
    }

    pub fn enforcer_mut(&mut self) -> &mut EffectivenessInteractionEnforcer {
        &mut self.enforcer
    }
}

/// Read the control point layout and dataset indices saved in `dir`.
pub fn load_state(dir: impl AsRef<Path>) -> Result<(Embedding, Vec<usize>)> {
    let dir = dir.as_ref();
    let ys = load_matrix(dir.join(CP_EMBEDDING_FILE))?;
    let control = load_indices(dir.join(CP_INDICES_FILE))?;
    if ys.nrows() != control.len() {
        return Err(Error::shape("saved control point layout", control.len(), ys.nrows()));
    }
    Ok((ys, control))
}
