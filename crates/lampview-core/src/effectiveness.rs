//! Labels selections by whether the latest edit improved their distortion
//!
//! The enforcer keeps one label per dataset row: `+1` (measure went up),
//! `-1` (went down) or `0` (unchanged or never labeled). Labels persist across
//! edits and are only overwritten for the rows of the selection active when a
//! delta arrives.

use ndarray::ArrayView1;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{Publisher, SubscriptionId};
use crate::interaction::SelectionHandler;

pub struct EffectivenessInteractionEnforcer {
    selector: SelectionHandler,
    n: usize,
    selection: Vec<usize>,
    effectiveness: Vec<i8>,
    updates: Publisher<Vec<i8>>,
}

impl EffectivenessInteractionEnforcer {
    /// `index_map[local]` is the dataset row of sample-local index `local`.
    pub fn new(index_map: Vec<usize>, n: usize) -> Result<Self> {
        Ok(Self::with_selector(SelectionHandler::new(index_map, n)?))
    }

    /// Enforcer whose local indices are dataset rows.
    pub fn identity(n: usize) -> Self {
        Self::with_selector(SelectionHandler::identity(n))
    }

    pub fn with_selector(selector: SelectionHandler) -> Self {
        let n = selector.dataset_len();
        Self {
            selector,
            n,
            selection: Vec::new(),
            effectiveness: vec![0; n],
            updates: Publisher::new(),
        }
    }

    /// Store a new selection of sample-local indices. Labeling waits for the
    /// next delta.
    pub fn set_selection(&mut self, local: &[usize]) -> Result<()> {
        self.selection = self
            .selector
            .translate(local)
            .inspect_err(|e| warn!(error = %e, "selection rejected"))?;
        Ok(())
    }

    /// Same as [`set_selection`](Self::set_selection) from a per-item mask of the view.
    pub fn set_selection_mask(&mut self, mask: &[bool]) -> Result<()> {
        let local = self.selector.mask_to_local(mask)?;
        self.set_selection(&local)
    }

    /// Selected rows, dataset-global and sorted.
    pub fn selection(&self) -> &[usize] {
        &self.selection
    }

    pub fn effectiveness(&self) -> &[i8] {
        &self.effectiveness
    }

    /// Length of every accepted delta.
    pub fn dataset_len(&self) -> usize {
        self.n
    }

    pub fn on_update<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Vec<i8>) + Send + 'static,
    {
        self.updates.subscribe(callback)
    }

    /// Label the current selection from a length-N distortion delta.
    ///
    /// Returns the label applied, or `None` when the selection is empty (the
    /// effectiveness vector is then left alone and nothing is published).
    pub fn set_measure_difference(&mut self, delta: ArrayView1<'_, f64>) -> Result<Option<i8>> {
        if delta.len() != self.n {
            warn!(expected = self.n, len = delta.len(), "rejected distortion delta");
            return Err(Error::shape("distortion delta", self.n, delta.len()));
        }
        if self.selection.is_empty() {
            return Ok(None);
        }

        let mean = self.selection.iter().map(|&g| delta[g]).sum::<f64>() / self.selection.len() as f64;
        let label = if mean > 0.0 {
            1
        } else if mean < 0.0 {
            -1
        } else {
            0
        };
        for &g in &self.selection {
            self.effectiveness[g] = label;
        }
        debug!(mean, label, selected = self.selection.len(), "effectiveness updated");
        self.updates.publish(&self.effectiveness);
        Ok(Some(label))
    }

    /// Forget every label.
    pub fn clear(&mut self) {
        self.effectiveness.iter_mut().for_each(|e| *e = 0);
        self.updates.publish(&self.effectiveness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn positive_delta_labels_selection_up() {
        let mut e = EffectivenessInteractionEnforcer::new(vec![1, 3, 4], 5).unwrap();
        e.set_selection(&[0, 2]).unwrap();
        assert_eq!(e.selection(), &[1, 4]);

        let label = e
            .set_measure_difference(array![-9.0, 0.5, -9.0, -9.0, 0.1].view())
            .unwrap();
        assert_eq!(label, Some(1));
        assert_eq!(e.effectiveness(), &[0, 1, 0, 0, 1]);
    }

    #[test]
    fn sign_of_mean_decides() {
        let mut e = EffectivenessInteractionEnforcer::identity(3);
        e.set_selection(&[0, 1]).unwrap();
        assert_eq!(e.set_measure_difference(array![1.0, -3.0, 0.0].view()).unwrap(), Some(-1));
        assert_eq!(e.set_measure_difference(array![1.0, -1.0, 0.0].view()).unwrap(), Some(0));
        assert_eq!(e.effectiveness(), &[0, 0, 0]);
    }

    #[test]
    fn labels_persist_outside_new_selection() {
        let mut e = EffectivenessInteractionEnforcer::identity(4);
        e.set_selection(&[0]).unwrap();
        e.set_measure_difference(Array1::from_elem(4, 1.0).view()).unwrap();
        e.set_selection(&[2, 3]).unwrap();
        e.set_measure_difference(Array1::from_elem(4, -1.0).view()).unwrap();
        assert_eq!(e.effectiveness(), &[1, 0, -1, -1]);
    }

    #[test]
    fn empty_selection_never_publishes() {
        let mut e = EffectivenessInteractionEnforcer::identity(3);
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        e.on_update(move |_| *c.lock() += 1);

        assert_eq!(e.set_measure_difference(Array1::ones(3).view()).unwrap(), None);
        assert_eq!(*count.lock(), 0);
        assert_eq!(e.effectiveness(), &[0, 0, 0]);

        e.set_selection(&[1]).unwrap();
        e.set_measure_difference(Array1::ones(3).view()).unwrap();
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn bad_inputs_leave_state_unchanged() {
        let mut e = EffectivenessInteractionEnforcer::identity(3);
        e.set_selection(&[1]).unwrap();
        assert!(e.set_selection(&[0, 3]).is_err());
        assert_eq!(e.selection(), &[1]);
        assert!(e.set_measure_difference(Array1::ones(2).view()).is_err());
        assert_eq!(e.effectiveness(), &[0, 0, 0]);
        assert!(e.set_selection_mask(&[true, true]).is_err());
        assert_eq!(e.selection(), &[1]);
        assert!(EffectivenessInteractionEnforcer::new(vec![0, 5], 5).is_err());
    }

    #[test]
    fn clear_forgets_labels_and_publishes() {
        let mut e = EffectivenessInteractionEnforcer::identity(3);
        let published = Arc::new(Mutex::new(Vec::new()));
        let p = published.clone();
        e.on_update(move |labels| p.lock().push(labels.clone()));

        e.set_selection(&[0, 2]).unwrap();
        e.set_measure_difference(Array1::from_elem(3, -0.5).view()).unwrap();
        assert_eq!(e.effectiveness(), &[-1, 0, -1]);

        e.clear();
        assert_eq!(e.effectiveness(), &[0, 0, 0]);
        assert_eq!(e.selection(), &[0, 2]);
        assert_eq!(*published.lock(), vec![vec![-1, 0, -1], vec![0, 0, 0]]);
        assert_eq!(e.dataset_len(), 3);
    }
}
