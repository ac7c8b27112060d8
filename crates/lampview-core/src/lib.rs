//! lampview Core Engine
//!
//! Interactive multidimensional projection: a small set of control points is
//! placed in 2D (by force scheme or by hand) and every other row follows via
//! LAMP or PLMP. Each edit is measured against the high-dimensional distances
//! and can be undone, reset or partially rewound.
//!
//! # Features
//!
//! - `parallel` - Distance matrices, LAMP rows and t-SNE bandwidth search on the rayon pool
//!
//! # Example
//!
//! ```rust
//! use lampview_core::{lamp, Session, SessionConfig};
//! use ndarray::array;
//!
//! // All four corners are control points: LAMP reproduces them
//! let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
//! let y = lamp(x.view(), &[0, 1, 2, 3], x.view()).unwrap();
//! assert!((&y - &x).iter().all(|v| v.abs() < 1e-9));
//!
//! // A session with two control points, moved by hand
//! let mut session = Session::new(x.clone(), &[0, 3], SessionConfig::default()).unwrap();
//! session.set_control_points(array![[0.0, 0.0], [2.0, 2.0]].view()).unwrap();
//! session.move_control_points(&[1], -1.0, 0.0).unwrap();
//! session.undo().unwrap();
//! ```

pub mod context;
pub mod distance;
pub mod effectiveness;
pub mod error;
pub mod events;
pub mod history;
pub mod interaction;
pub mod io;
pub mod knn;
pub mod manipulation;
pub mod metrics;
pub mod observer;
pub mod projection;
pub mod sampling;
pub mod session;
pub mod types;

// Re-export main types at crate root
pub use context::SessionContext;
pub use distance::{compute_distance_matrix, compute_distance_matrix_with, Metric};
pub use effectiveness::EffectivenessInteractionEnforcer;
pub use error::{Error, Result};
pub use events::{Publisher, SubscriptionId};
pub use history::ProjectionHistory;
pub use interaction::{InteractionHandler, SelectionHandler};
pub use io::{load_dataset, load_indices, load_matrix, save_indices, save_matrix, Dataset};
pub use knn::{knn, knn_all, Neighbors};
pub use manipulation::ManipulationController;
pub use metrics::{d2p, kl_divergence, neighborhood_preservation, stress, stress_per_point};
pub use observer::{DistortionMeasure, DistortionObserver, DistortionUpdate, MeasureMode, ObserverScope};
pub use projection::{
    calc_p, force_scheme, force_scheme_from, h_beta, lamp, lamp_with, plmp, tsne, ForceSchemeConfig,
    ForceSchemeReport, LampConfig, Technique, TsneConfig,
};
pub use sampling::{default_control_point_count, sample_control_points};
pub use session::{load_state, ObserverSpec, Session, SessionConfig};
pub use types::{
    DataMatrix, DistanceMatrix, DistortionVector, Embedding, ExecutionMode, IndexPartition, EMBEDDING_DIMS,
};
