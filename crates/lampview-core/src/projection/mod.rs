//! Projection techniques
//!
//! - **LAMP**: per-point orthogonal affine maps anchored on control points
//! - **PLMP**: one global least-squares linear map anchored on control points
//! - **Force Scheme**: stochastic placement matching a target distance matrix
//! - **t-SNE**: gradient descent on a Student-t neighbor distribution
//!
//! LAMP and PLMP are out-of-sample extensions: they pin the control point rows
//! to the supplied `Ys` and derive everything else. Force Scheme is used to lay
//! out the control points themselves; t-SNE embeds a whole dataset at once.

pub mod force_scheme;
pub mod lamp;
pub mod plmp;
pub mod tsne;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Embedding, ExecutionMode};

pub use force_scheme::{force_scheme, force_scheme_from, ForceSchemeConfig, ForceSchemeReport};
pub use lamp::{lamp, lamp_weights, lamp_with, LampConfig};
pub use plmp::plmp;
pub use tsne::{calc_p, h_beta, tsne, TsneConfig};

/// Out-of-sample technique used to re-project the dataset from control points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    #[default]
    Lamp,
    Plmp,
}

impl Technique {
    /// Project every row of `x` given the 2D positions `ys` of the `control` rows.
    pub fn project(
        self,
        x: ArrayView2<'_, f64>,
        control: &[usize],
        ys: ArrayView2<'_, f64>,
        lamp_config: &LampConfig,
        mode: ExecutionMode,
    ) -> Result<Embedding> {
        match self {
            Self::Lamp => lamp_with(x, control, ys, lamp_config, mode),
            Self::Plmp => plmp(x, control, ys),
        }
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lamp => write!(f, "lamp"),
            Self::Plmp => write!(f, "plmp"),
        }
    }
}
