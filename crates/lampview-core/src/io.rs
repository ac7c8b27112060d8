//! Plain-text numeric tables on disk
//!
//! Datasets, embeddings and index lists are whitespace-delimited ASCII, one
//! row per line. Blank lines are ignored.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::DataMatrix;

/// Feature matrix plus the per-row label taken from the last column.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: DataMatrix,
    pub labels: Array1<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }
}

/// Load a dataset whose last column is a label.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let table = load_matrix(path)?;
    if table.ncols() < 2 {
        return Err(Error::Parse {
            line: 1,
            message: format!("dataset needs a feature and a label column, found {}", table.ncols()),
        });
    }
    let label_col = table.ncols() - 1;
    let labels = table.column(label_col).to_owned();
    let features = table.slice(ndarray::s![.., ..label_col]).to_owned();
    info!(path = %path.display(), rows = features.nrows(), dims = features.ncols(), "dataset loaded");
    Ok(Dataset { features, labels })
}

/// Load a rectangular numeric table.
pub fn load_matrix(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_matrix(&text)
}

/// Parse a rectangular numeric table from text.
pub fn parse_matrix(text: &str) -> Result<Array2<f64>> {
    let mut values = Vec::new();
    let mut cols: Option<usize> = None;
    let mut rows = 0;

    for (lineno, line) in text.lines().enumerate() {
        let line_no = lineno + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        match cols {
            None => cols = Some(fields.len()),
            Some(c) if c != fields.len() => {
                return Err(Error::Parse {
                    line: line_no,
                    message: format!("expected {} columns, found {}", c, fields.len()),
                });
            }
            Some(_) => {}
        }
        for field in fields {
            let v: f64 = field.parse().map_err(|_| Error::Parse {
                line: line_no,
                message: format!("not a number: {:?}", field),
            })?;
            values.push(v);
        }
        rows += 1;
    }

    let cols = cols.ok_or_else(|| Error::EmptyInput("numeric table".into()))?;
    Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::Parse {
        line: rows,
        message: e.to_string(),
    })
}

/// Write a matrix one row per line, values separated by a single space.
pub fn save_matrix(path: impl AsRef<Path>, m: ArrayView2<'_, f64>) -> Result<()> {
    let mut out = String::new();
    for row in m.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    fs::write(path.as_ref(), out)?;
    debug!(path = %path.as_ref().display(), rows = m.nrows(), "matrix saved");
    Ok(())
}

/// Load non-negative integer indices, any whitespace between them.
pub fn load_indices(path: impl AsRef<Path>) -> Result<Vec<usize>> {
    let text = fs::read_to_string(path.as_ref())?;
    let mut indices = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        for field in line.split_whitespace() {
            let i = field.parse().map_err(|_| Error::Parse {
                line: lineno + 1,
                message: format!("not an index: {:?}", field),
            })?;
            indices.push(i);
        }
    }
    Ok(indices)
}

/// Write one index per line.
pub fn save_indices(path: impl AsRef<Path>, indices: &[usize]) -> Result<()> {
    let mut out = String::with_capacity(indices.len() * 4);
    for i in indices {
        out.push_str(&i.to_string());
        out.push('\n');
    }
    fs::write(path.as_ref(), out)?;
    Ok(())
}
