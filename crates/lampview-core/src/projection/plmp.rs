//! Part-Linear Multidimensional Projection
//!
//! A single linear map, fitted by least squares between the centered control
//! points and their centered 2D positions, is applied to the whole dataset.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2, Axis};
use tracing::warn;

use crate::error::{Error, Result};
use crate::projection::lamp::validate_control;
use crate::types::{Embedding, EMBEDDING_DIMS};

/// Reciprocal condition number below which the normal equations are rejected.
const MIN_RCOND: f64 = 1e-12;

/// Fit a global linear map on the control points and project every row.
///
/// Fails with [`Error::SingularSystem`] when the control points do not span the
/// feature space (e.g. fewer control points than features, or collinear ones).
pub fn plmp(x: ArrayView2<'_, f64>, control: &[usize], ys: ArrayView2<'_, f64>) -> Result<Embedding> {
    validate_control(x, control, ys)?;

    let dims = x.ncols();
    let xs = x.select(Axis(0), control);
    let x_mean = xs
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::EmptyInput("control point set".into()))?;
    let y_mean = ys
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::EmptyInput("control point embedding".into()))?;

    let xc = DMatrix::from_fn(control.len(), dims, |r, c| xs[[r, c]] - x_mean[c]);
    let yc = DMatrix::from_fn(control.len(), EMBEDDING_DIMS, |r, c| ys[[r, c]] - y_mean[c]);

    let xt = xc.transpose();
    let normal = &xt * &xc;
    let rhs = &xt * &yc;

    let svd = normal.svd(true, true);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    if max_sv.is_nan() || max_sv <= 0.0 || min_sv / max_sv < MIN_RCOND {
        warn!(
            control_points = control.len(),
            dims, "PLMP normal equations are singular"
        );
        return Err(Error::SingularSystem);
    }
    let map = svd.solve(&rhs, 0.0).map_err(|_| Error::SingularSystem)?;

    let mut y = Array2::zeros((x.nrows(), EMBEDDING_DIMS));
    for (i, row) in x.rows().into_iter().enumerate() {
        for out in 0..EMBEDDING_DIMS {
            let mut acc = y_mean[out];
            for c in 0..dims {
                acc += (row[c] - x_mean[c]) * map[(c, out)];
            }
            y[[i, out]] = acc;
        }
    }
    for (local, &i) in control.iter().enumerate() {
        y.row_mut(i).assign(&ys.row(local));
    }

    Ok(y)
}
