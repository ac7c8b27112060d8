//! End-to-end editing flow through a Session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lampview_core::{
    DataMatrix, DistortionMeasure, Error, ExecutionMode, MeasureMode, ObserverScope, ObserverSpec, Session,
    SessionConfig, Technique,
};
use ndarray::{array, Array1, Array2, ArrayView2};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

/// Two well separated 2D clusters without tied distances
fn clusters() -> DataMatrix {
    array![
        [0.0, 0.0],
        [1.0, 0.2],
        [0.3, 1.0],
        [1.2, 1.3],
        [10.0, 10.0],
        [11.1, 10.3],
        [10.2, 11.4],
        [11.5, 11.2],
    ]
}

const CONTROL: [usize; 4] = [0, 3, 4, 7];

/// Control points at their own coordinates: LAMP then reproduces the data
fn faithful_ys() -> Array2<f64> {
    array![[0.0, 0.0], [1.2, 1.3], [10.0, 10.0], [11.5, 11.2]]
}

fn config() -> SessionConfig {
    SessionConfig {
        execution: ExecutionMode::Sequential,
        observers: vec![ObserverSpec {
            measure: DistortionMeasure::NeighborhoodPreservation { k: 2 },
            mode: MeasureMode::DiffPrevious,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Config with a second observer whose measure fails while `fail` is set
fn config_with_switchable_failure(fail: Arc<AtomicBool>) -> SessionConfig {
    let measure = move |a: ArrayView2<'_, f64>, _b: ArrayView2<'_, f64>| -> lampview_core::Result<Array1<f64>> {
        if fail.load(Ordering::SeqCst) {
            return Err(Error::NoMap);
        }
        Ok(Array1::zeros(a.nrows()))
    };
    let mut cfg = config();
    cfg.observers.push(ObserverSpec {
        measure: DistortionMeasure::Custom(Arc::new(measure)),
        mode: MeasureMode::Current,
        ..Default::default()
    });
    cfg
}

fn assert_close(a: &Array2<f64>, b: &Array2<f64>) {
    assert_eq!(a.dim(), b.dim());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-9, "{} != {}", x, y);
    }
}

#[test]
fn test_first_map_reproduces_data() {
    let mut session = Session::new(clusters(), &CONTROL, config()).unwrap();
    let y = session.set_control_points(faithful_ys().view()).unwrap().clone();
    assert_close(&y, &clusters());

    let observer = &session.observers()[0];
    assert_eq!(observer.current().unwrap().to_vec(), vec![1.0; 8]);
}

#[test]
fn test_undo_reset_and_rewind() {
    let mut session = Session::new(clusters(), &CONTROL, config()).unwrap();
    let first = session.set_control_points(faithful_ys().view()).unwrap().clone();

    assert!(matches!(session.rewind(0.5), Err(Error::NoPreviousMap)));

    let second = session.move_control_points(&[0], 2.0, -1.0).unwrap().clone();
    assert_eq!(second[[0, 0]], 2.0);

    // Rewind only shows a blend, nothing is stored
    let halfway = session.rewind(0.5).unwrap();
    assert_close(&halfway, &((&first + &second) * 0.5));
    assert_eq!(session.current(), Some(&second));

    let restored = session.undo().unwrap().clone();
    assert_eq!(restored, first);
    assert!(matches!(session.undo(), Err(Error::NoPreviousMap)));
    assert!(session.rewind(1.0).is_err());

    for step in 1..=3 {
        session.move_control_points(&[2], step as f64, 0.0).unwrap();
    }
    let reset = session.reset().unwrap().clone();
    assert_eq!(reset, first);
    assert_eq!(session.history().current(), Some(&first));
    assert_eq!(session.control_positions().unwrap(), faithful_ys());
}

#[test]
fn test_effectiveness_labels_worsened_selection() {
    let mut session = Session::new(clusters(), &CONTROL, config()).unwrap();
    let labels = Arc::new(Mutex::new(Vec::new()));
    let l = labels.clone();
    session.enforcer_mut().on_update(move |e| l.lock().push(e.clone()));

    session.set_selection(&[0, 1, 2]).unwrap();
    session.set_control_points(faithful_ys().view()).unwrap();
    // First map only sets the baseline
    assert!(labels.lock().is_empty());

    // Drag a control point of the first cluster into the second one
    session.move_control_points(&[0], 10.5, 10.5).unwrap();
    assert_eq!(session.enforcer().effectiveness(), &[-1, -1, -1, 0, 0, 0, 0, 0]);
    assert_eq!(labels.lock().len(), 1);

    // Undo restores the neighborhoods, so the same selection improves
    session.undo().unwrap();
    assert_eq!(session.enforcer().effectiveness(), &[1, 1, 1, 0, 0, 0, 0, 0]);
}

#[test]
fn test_empty_selection_keeps_effectiveness() {
    let mut session = Session::new(clusters(), &CONTROL, config()).unwrap();
    session.set_control_points(faithful_ys().view()).unwrap();
    session.move_control_points(&[0], 10.5, 10.5).unwrap();
    assert_eq!(session.enforcer().effectiveness(), &[0; 8]);
}

#[test]
fn test_current_mode_does_not_label() {
    let mut cfg = config();
    cfg.observers[0].mode = MeasureMode::Current;
    let mut session = Session::new(clusters(), &CONTROL, cfg).unwrap();
    session.set_selection(&[0]).unwrap();
    session.set_control_points(faithful_ys().view()).unwrap();
    session.move_control_points(&[0], 10.5, 10.5).unwrap();
    assert_eq!(session.enforcer().effectiveness(), &[0; 8]);
}

#[test]
fn test_measure_mode_switching() {
    let mut session = Session::new(clusters(), &CONTROL, config()).unwrap();
    session.set_control_points(faithful_ys().view()).unwrap();

    assert!(matches!(
        session.set_measure_mode(0, MeasureMode::DiffPrevious),
        Err(Error::NoPreviousMap)
    ));
    assert_eq!(session.set_measure_mode(0, MeasureMode::DiffFirst).unwrap(), None);

    session.move_control_points(&[0], 10.5, 10.5).unwrap();
    let update = session.set_measure_mode(0, MeasureMode::Current).unwrap().unwrap();
    assert_eq!(update.mode, MeasureMode::Current);
    assert!(update.values[0] < 1.0);

    assert!(matches!(
        session.set_measure_mode(3, MeasureMode::Current),
        Err(Error::IndexOutOfBounds { index: 3, len: 1 })
    ));
}

#[test]
fn test_rejected_edit_leaves_session_untouched() {
    let mut session = Session::new(clusters(), &CONTROL, config()).unwrap();
    let first = session.set_control_points(faithful_ys().view()).unwrap().clone();

    assert!(session.set_control_points(array![[0.0, 0.0]].view()).is_err());
    assert!(session.move_control_points(&[4], 1.0, 1.0).is_err());
    assert!(session.set_selection(&[8]).is_err());

    assert_eq!(session.current(), Some(&first));
    assert!(!session.history().has_prev());
}

#[test]
fn test_publications_reach_subscribers() {
    let mut session = Session::new(clusters(), &CONTROL, config()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));

    let e = events.clone();
    session
        .controller_mut()
        .on_control_points(move |ys| e.lock().push(format!("cp:{}", ys.nrows())));
    let e = events.clone();
    session
        .controller_mut()
        .on_regular_points(move |ys| e.lock().push(format!("rp:{}", ys.nrows())));
    let e = events.clone();
    session
        .observer_mut(0)
        .unwrap()
        .on_update(move |u| e.lock().push(format!("delta:{}", u.values.len())));
    let e = events.clone();
    session
        .history_mut()
        .on_map_changed(move |_| e.lock().push("history".to_string()));

    session.set_control_points(faithful_ys().view()).unwrap();
    session.move_control_points(&[1], 0.5, 0.0).unwrap();
    session.undo().unwrap();

    assert_eq!(
        *events.lock(),
        vec![
            "cp:4", "rp:4", // first map, no delta yet
            "cp:4", "rp:4", "delta:8", // edit
            "history", "cp:4", "rp:4", "delta:8", // undo
        ]
    );
}

#[test]
fn test_bootstrap_projects_every_row() {
    let data = Array2::from_shape_fn((30, 4), |(i, j)| ((i * 13 + j * 7) % 17) as f64 + (i % 3) as f64 * 5.0);
    let session = Session::bootstrap(data, config(), None, Some(7)).unwrap();

    assert_eq!(session.context().partition().control().len(), 6);
    let y = session.current().unwrap();
    assert_eq!(y.dim(), (30, 2));
    assert!(y.iter().all(|v| v.is_finite()));
    assert!(session.history().has_first());
    assert!(!session.history().has_prev());
}

#[test]
fn test_plmp_session() {
    let mut cfg = config();
    cfg.technique = Technique::Plmp;
    let mut session = Session::new(clusters(), &CONTROL, cfg).unwrap();
    let y = session.set_control_points(faithful_ys().view()).unwrap().clone();
    // The data is already 2D, so the least-squares map is the identity
    assert_close(&y, &clusters());
}

#[test]
fn test_failed_measure_leaves_session_untouched() {
    let fail = Arc::new(AtomicBool::new(false));
    let mut session = Session::new(clusters(), &CONTROL, config_with_switchable_failure(fail.clone())).unwrap();
    let published = Arc::new(Mutex::new(0));
    let p = published.clone();
    session.controller_mut().on_embedding(move |_| *p.lock() += 1);

    session.set_selection(&[0, 1, 2]).unwrap();
    let first = session.set_control_points(faithful_ys().view()).unwrap().clone();
    let measured = session.observers()[0].current().cloned();

    fail.store(true, Ordering::SeqCst);
    assert!(matches!(session.move_control_points(&[0], 5.0, 5.0), Err(Error::NoMap)));

    assert_eq!(session.current(), Some(&first));
    assert_eq!(session.history().current(), Some(&first));
    assert!(!session.history().has_prev());
    assert!(session.controller().previous().is_none());
    assert_eq!(session.control_positions().unwrap(), faithful_ys());
    assert_eq!(session.observers()[0].current().cloned(), measured);
    assert_eq!(session.enforcer().effectiveness(), &[0; 8]);
    assert_eq!(*published.lock(), 1);

    // Gestures still start from the committed layout
    fail.store(false, Ordering::SeqCst);
    session.move_control_points(&[0], 1.0, 0.0).unwrap();
    assert_eq!(session.control_positions().unwrap()[[0, 0]], 1.0);
    assert_eq!(session.history().previous(), Some(&first));
    assert_eq!(*published.lock(), 2);
}

#[test]
fn test_failed_measure_keeps_undo_and_reset_targets() {
    let fail = Arc::new(AtomicBool::new(false));
    let mut session = Session::new(clusters(), &CONTROL, config_with_switchable_failure(fail.clone())).unwrap();
    let first = session.set_control_points(faithful_ys().view()).unwrap().clone();
    let second = session.move_control_points(&[2], 1.0, 0.0).unwrap().clone();
    let measured = session.observers()[0].current().cloned();

    fail.store(true, Ordering::SeqCst);
    assert!(session.undo().is_err());
    assert!(session.reset().is_err());

    assert_eq!(session.current(), Some(&second));
    assert_eq!(session.history().current(), Some(&second));
    assert!(session.history().has_prev());
    assert_eq!(session.observers()[0].current().cloned(), measured);
    assert!(session.rewind(0.5).is_ok());

    fail.store(false, Ordering::SeqCst);
    assert_eq!(session.undo().unwrap(), &first);
}

#[test]
fn test_row_scoped_observer_and_selection() {
    let mut cfg = config();
    cfg.observers = vec![ObserverSpec {
        measure: DistortionMeasure::Stress,
        mode: MeasureMode::Current,
        scope: ObserverScope::Rows(vec![5, 1, 2]),
    }];
    cfg.effectiveness_observer = None;
    cfg.selection_scope = ObserverScope::Rows(vec![7, 0]);
    let mut session = Session::new(clusters(), &CONTROL, cfg).unwrap();

    session.set_selection(&[0]).unwrap();
    assert_eq!(session.enforcer().selection(), &[7]);
    assert!(session.set_selection(&[2]).is_err());

    session.set_control_points(faithful_ys().view()).unwrap();
    session.move_control_points(&[0], 3.0, 0.0).unwrap();
    let values = session.observers()[0].current().unwrap();
    assert!(values[1] > 0.0);
    for row in [0, 3, 4, 6, 7] {
        assert_eq!(values[row], 0.0);
    }
}

#[test]
fn test_row_scope_outside_dataset_is_rejected() {
    let mut cfg = config();
    cfg.observers[0].scope = ObserverScope::Rows(vec![1, 8]);
    assert!(matches!(
        Session::new(clusters(), &CONTROL, cfg),
        Err(Error::IndexOutOfBounds { index: 8, len: 8 })
    ));
}
