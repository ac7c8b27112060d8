//! Undo/reset state machine over embedding snapshots
//!
//! ```text
//! add_map(Y): if has_first { previous <- current }; current <- Y; first <- Y once
//! undo():     if has_prev  { current <- previous; drop previous; publish }
//! reset():    if has_first { current <- first;    drop previous; publish }
//! ```
//!
//! Only three slots are retained, so there is no chain of older maps to walk.
//! The history also answers analytical questions about the latest edit:
//! how far points moved, how distances to a selection changed, and how much
//! LAMP weight flows between selected and unselected points.

use std::sync::Arc;

use ndarray::{Array1, ArrayView2};
use tracing::{debug, warn};

use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::events::{Publisher, SubscriptionId};
use crate::projection::{lamp_weights, LampConfig};
use crate::types::{DistortionVector, Embedding, EMBEDDING_DIMS};

pub struct ProjectionHistory {
    context: Arc<SessionContext>,
    lamp_config: LampConfig,
    current: Option<Embedding>,
    previous: Option<Embedding>,
    first: Option<Embedding>,
    map_changed: Publisher<Embedding>,
}

impl ProjectionHistory {
    pub fn new(context: Arc<SessionContext>) -> Self {
        Self::with_lamp_config(context, LampConfig::default())
    }

    /// `lamp_config` must match the one used for re-projection so weights agree.
    pub fn with_lamp_config(context: Arc<SessionContext>, lamp_config: LampConfig) -> Self {
        Self {
            context,
            lamp_config,
            current: None,
            previous: None,
            first: None,
            map_changed: Publisher::new(),
        }
    }

    pub fn has_first(&self) -> bool {
        self.first.is_some()
    }

    pub fn has_prev(&self) -> bool {
        self.previous.is_some()
    }

    /// Record a newly produced map.
    pub fn add_map(&mut self, y: Embedding) -> Result<()> {
        let expected = (self.context.len(), EMBEDDING_DIMS);
        if y.dim() != expected {
            warn!(rows = y.nrows(), cols = y.ncols(), "rejected map with wrong shape");
            return Err(Error::shape(
                "embedding",
                format!("{}x{}", expected.0, expected.1),
                format!("{}x{}", y.nrows(), y.ncols()),
            ));
        }

        if self.first.is_some() {
            self.previous = self.current.take();
        } else {
            self.first = Some(y.clone());
        }
        self.current = Some(y);
        debug!(has_prev = self.has_prev(), "map added to history");
        Ok(())
    }

    /// Step back to the previous map. Returns `None` (no-op) without one.
    pub fn undo(&mut self) -> Option<&Embedding> {
        let previous = self.previous.take()?;
        self.map_changed.publish(&previous);
        self.current = Some(previous);
        self.current.as_ref()
    }

    /// Return to the first map of the session. Returns `None` (no-op) before any map.
    pub fn reset(&mut self) -> Option<&Embedding> {
        let first = self.first.clone()?;
        self.previous = None;
        self.map_changed.publish(&first);
        self.current = Some(first);
        self.current.as_ref()
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

    pub fn on_map_changed<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Embedding) + Send + 'static,
    {
        self.map_changed.subscribe(callback)
    }

    fn pair(&self) -> Result<(ArrayView2<'_, f64>, ArrayView2<'_, f64>)> {
        match (&self.current, &self.previous) {
            (Some(c), Some(p)) => Ok((c.view(), p.view())),
            (None, _) => Err(Error::NoMap),
            (Some(_), None) => Err(Error::NoPreviousMap),
        }
    }

    /// Euclidean movement of each point between the previous and current map.
    pub fn displacement(&self) -> Result<DistortionVector> {
        let (current, previous) = self.pair()?;
        Ok(current
            .rows()
            .into_iter()
            .zip(previous.rows())
            .map(|(c, p)| {
                let dx = c[0] - p[0];
                let dy = c[1] - p[1];
                (dx * dx + dy * dy).sqrt()
            })
            .collect())
    }

    /// Per point, the mean absolute change of its 2D distance to the selected
    /// (global) points between the previous and current map.
    pub fn selective_distortion(&self, selection: &[usize]) -> Result<DistortionVector> {
        let (current, previous) = self.pair()?;
        let n = current.nrows();
        check_indices(selection, n)?;
        if selection.is_empty() {
            return Ok(Array1::zeros(n));
        }

        let dist = |y: &ArrayView2<'_, f64>, i: usize, j: usize| {
            let dx = y[[i, 0]] - y[[j, 0]];
            let dy = y[[i, 1]] - y[[j, 1]];
            (dx * dx + dy * dy).sqrt()
        };

        Ok((0..n)
            .map(|i| {
                let total: f64 = selection
                    .iter()
                    .map(|&s| (dist(&current, i, s) - dist(&previous, i, s)).abs())
                    .sum();
                total / selection.len() as f64
            })
            .collect())
    }

    /// Share of each regular point's LAMP weight carried by the selected
    /// control points (local indices). Selected control points get 1, the
    /// rest 0.
    pub fn influence(&self, cp_selection: &[usize]) -> Result<DistortionVector> {
        let partition = self.context.partition();
        let control = partition.control();
        check_indices(cp_selection, control.len())?;

        let mut selected = vec![false; control.len()];
        for &s in cp_selection {
            selected[s] = true;
        }

        let xs = self.context.control_data();
        let data = self.context.data();
        let mut out = Array1::zeros(self.context.len());
        for (local, &global) in control.iter().enumerate() {
            out[global] = if selected[local] { 1.0 } else { 0.0 };
        }
        for &global in partition.regular() {
            let weights = lamp_weights(data.row(global), xs.view(), self.lamp_config.epsilon);
            let total: f64 = weights.iter().sum();
            let carried: f64 = weights
                .iter()
                .zip(&selected)
                .filter(|&(_, &sel)| sel)
                .map(|(w, _)| w)
                .sum();
            out[global] = carried / total;
        }
        Ok(out)
    }

    /// For every control point, the mean share of LAMP weight it carries over
    /// the selected regular points (local indices). Regular points get 0.
    pub fn unreliability(&self, rp_selection: &[usize]) -> Result<DistortionVector> {
        let partition = self.context.partition();
        let regular = partition.regular();
        check_indices(rp_selection, regular.len())?;

        let control = partition.control();
        let mut out = Array1::zeros(self.context.len());
        if rp_selection.is_empty() {
            return Ok(out);
        }

        let xs = self.context.control_data();
        let data = self.context.data();
        let mut shares = vec![0.0; control.len()];
        for &local in rp_selection {
            let weights = lamp_weights(data.row(regular[local]), xs.view(), self.lamp_config.epsilon);
            let total: f64 = weights.iter().sum();
            for (share, w) in shares.iter_mut().zip(&weights) {
                *share += w / total;
            }
        }
        for (share, &global) in shares.iter().zip(control) {
            out[global] = share / rp_selection.len() as f64;
        }
        Ok(out)
    }
}

fn check_indices(indices: &[usize], len: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= len) {
        Some(&index) => Err(Error::IndexOutOfBounds { index, len }),
        None => Ok(()),
    }
}
