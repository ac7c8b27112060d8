//! Local Affine Multidimensional Projection
//!
//! Every regular point gets its own orthogonal affine map fitted to the control
//! points, weighted by inverse squared distance. Control point rows of the
//! output are copied from `Ys` verbatim.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::distance::squared_euclidean;
use crate::error::{Error, Result};
use crate::types::{Embedding, ExecutionMode, EMBEDDING_DIMS};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LampConfig {
    /// Floor on squared distances before inversion
    pub epsilon: f64,
}

impl Default for LampConfig {
    fn default() -> Self {
        Self { epsilon: 1e-7 }
    }
}

/// LAMP with default configuration and execution mode.
pub fn lamp(x: ArrayView2<'_, f64>, control: &[usize], ys: ArrayView2<'_, f64>) -> Result<Embedding> {
    lamp_with(x, control, ys, &LampConfig::default(), ExecutionMode::default())
}

pub fn lamp_with(
    x: ArrayView2<'_, f64>,
    control: &[usize],
    ys: ArrayView2<'_, f64>,
    config: &LampConfig,
    mode: ExecutionMode,
) -> Result<Embedding> {
    validate_control(x, control, ys)?;

    let n = x.nrows();
    let xs = x.select(ndarray::Axis(0), control);
    let mut is_control = vec![false; n];
    for &i in control {
        is_control[i] = true;
    }
    let targets: Vec<usize> = (0..n).filter(|&i| !is_control[i]).collect();

    let project = |i: usize| project_point(x.row(i), xs.view(), ys, config.epsilon);

    #[cfg(feature = "parallel")]
    let rows: Vec<[f64; 2]> = if mode.is_parallel() {
        targets.par_iter().map(|&i| project(i)).collect()
    } else {
        targets.iter().map(|&i| project(i)).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<[f64; 2]> = {
        let _ = mode;
        targets.iter().map(|&i| project(i)).collect()
    };

    let mut y = Array2::zeros((n, EMBEDDING_DIMS));
    for (&i, row) in targets.iter().zip(rows) {
        y[[i, 0]] = row[0];
        y[[i, 1]] = row[1];
    }
    for (local, &i) in control.iter().enumerate() {
        y.row_mut(i).assign(&ys.row(local));
    }

    Ok(y)
}

/// Inverse squared distance weights from `p` to each control point.
pub fn lamp_weights(p: ArrayView1<'_, f64>, xs: ArrayView2<'_, f64>, epsilon: f64) -> Vec<f64> {
    xs.rows()
        .into_iter()
        .map(|xj| 1.0 / squared_euclidean(p, xj).max(epsilon))
        .collect()
}

fn project_point(
    p: ArrayView1<'_, f64>,
    xs: ArrayView2<'_, f64>,
    ys: ArrayView2<'_, f64>,
    epsilon: f64,
) -> [f64; 2] {
    let dims = xs.ncols();
    let alphas = lamp_weights(p, xs, epsilon);
    let alpha_sum: f64 = alphas.iter().sum();

    let mut xtil = vec![0.0; dims];
    let mut ytil = [0.0; 2];
    for (j, &alpha) in alphas.iter().enumerate() {
        for (c, v) in xtil.iter_mut().enumerate() {
            *v += alpha * xs[[j, c]];
        }
        ytil[0] += alpha * ys[[j, 0]];
        ytil[1] += alpha * ys[[j, 1]];
    }
    for v in xtil.iter_mut() {
        *v /= alpha_sum;
    }
    ytil[0] /= alpha_sum;
    ytil[1] /= alpha_sum;

    // Cross-covariance of the sqrt(alpha)-scaled, centered control sets
    let mut cov = DMatrix::<f64>::zeros(dims, EMBEDDING_DIMS);
    for (j, &alpha) in alphas.iter().enumerate() {
        let yh = [ys[[j, 0]] - ytil[0], ys[[j, 1]] - ytil[1]];
        for r in 0..dims {
            let xh = alpha * (xs[[j, r]] - xtil[r]);
            cov[(r, 0)] += xh * yh[0];
            cov[(r, 1)] += xh * yh[1];
        }
    }

    let svd = cov.svd(true, true);
    let m = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => u * v_t,
        _ => DMatrix::zeros(dims, EMBEDDING_DIMS),
    };

    let mut out = ytil;
    for r in 0..dims {
        let centered = p[r] - xtil[r];
        out[0] += centered * m[(r, 0)];
        out[1] += centered * m[(r, 1)];
    }
    out
}

pub(crate) fn validate_control(
    x: ArrayView2<'_, f64>,
    control: &[usize],
    ys: ArrayView2<'_, f64>,
) -> Result<()> {
    if control.is_empty() {
        return Err(Error::EmptyInput("control point set".into()));
    }
    if ys.ncols() != EMBEDDING_DIMS {
        return Err(Error::shape("control point embedding columns", EMBEDDING_DIMS, ys.ncols()));
    }
    if ys.nrows() != control.len() {
        return Err(Error::shape("control point embedding rows", control.len(), ys.nrows()));
    }
    if let Some(&bad) = control.iter().find(|&&i| i >= x.nrows()) {
        return Err(Error::IndexOutOfBounds {
            index: bad,
            len: x.nrows(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn grid() -> Array2<f64> {
        Array2::from_shape_fn((16, 2), |(i, j)| {
            if j == 0 {
                (i % 4) as f64
            } else {
                (i / 4) as f64 * 1.5
            }
        })
    }

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{} vs {}", x, y);
        }
    }

    #[test]
    fn all_control_points_returns_ys() {
        let square = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let y = lamp(square.view(), &[0, 1, 2, 3], square.view()).unwrap();
        assert_eq!(y, square);
    }

    #[test]
    fn control_rows_are_pinned() {
        let x = Array2::from_shape_fn((12, 4), |(i, j)| ((i * 5 + j * 3) % 7) as f64);
        let control = [1, 4, 7, 10];
        let ys = array![[0.5, -1.0], [3.0, 2.0], [-2.0, 0.25], [1.0, 1.0]];
        let y = lamp(x.view(), &control, ys.view()).unwrap();
        for (local, &i) in control.iter().enumerate() {
            assert_eq!(y.row(i), ys.row(local));
        }
        assert!(y.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn identity_layout_is_reproduced() {
        let x = grid();
        let control = [0, 3, 5, 12, 15];
        let ys = x.select(ndarray::Axis(0), &control);
        let y = lamp(x.view(), &control, ys.view()).unwrap();
        assert_close(&y, &x, 1e-9);
    }

    #[test]
    fn rotated_layout_is_reproduced() {
        let x = grid();
        let control = [0, 3, 6, 12, 15];
        let (s, c) = 0.3f64.sin_cos();
        let rotation = array![[c, s], [-s, c]];
        let rotated = x.dot(&rotation);
        let ys = rotated.select(ndarray::Axis(0), &control);

        let y = lamp(x.view(), &control, ys.view()).unwrap();
        assert_close(&y, &rotated, 1e-9);
    }

    #[test]
    fn sequential_matches_parallel() {
        let x = Array2::from_shape_fn((30, 5), |(i, j)| ((i * 13 + j * 7) % 17) as f64 / 3.0);
        let control = [0, 5, 11, 17, 23, 29];
        let ys = Array2::from_shape_fn((6, 2), |(i, j)| (i as f64) * if j == 0 { 1.0 } else { -0.5 });
        let cfg = LampConfig::default();
        let a = lamp_with(x.view(), &control, ys.view(), &cfg, ExecutionMode::Sequential).unwrap();
        let b = lamp_with(x.view(), &control, ys.view(), &cfg, ExecutionMode::Parallel).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_inconsistent_shapes() {
        let x = grid();
        let ys = array![[0.0, 0.0], [1.0, 1.0]];
        assert!(matches!(
            lamp(x.view(), &[0, 1, 2], ys.view()),
            Err(Error::ShapeMismatch { .. })
        ));

        let wide = array![[0.0, 0.0, 0.0]];
        assert!(lamp(x.view(), &[0], wide.view()).is_err());
        assert!(matches!(
            lamp(x.view(), &[99], array![[0.0, 0.0]].view()),
            Err(Error::IndexOutOfBounds { index: 99, .. })
        ));
    }
}
