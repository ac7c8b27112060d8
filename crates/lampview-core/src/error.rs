//! Error types for projection and manipulation operations

use thiserror::Error;

/// Errors that can occur in the projection engine.
///
/// Shape and precondition failures are reported before any state is touched,
/// so callers can treat an `Err` as "nothing happened".
#[derive(Debug, Error)]
pub enum Error {
    /// A matrix or vector had the wrong dimensions
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// An index referred past the end of a collection
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Control/regular point partition is not a valid split of [0, N)
    #[error("invalid index partition: {0}")]
    InvalidPartition(String),

    /// Reference distance is zero off the diagonal where a divisor is required
    #[error("zero reference distance between rows {i} and {j}")]
    ZeroDistance { i: usize, j: usize },

    /// Normal equations of the global least-squares fit are singular
    #[error("singular or ill-conditioned linear system")]
    SingularSystem,

    /// Operation needs a previous map and none has been recorded
    #[error("no previous map available")]
    NoPreviousMap,

    /// Operation needs a current map and none has been recorded
    #[error("no map available")]
    NoMap,

    /// Input collection was empty where data is required
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed numeric text
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl Error {
    pub(crate) fn shape(what: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result type alias for lampview operations.
pub type Result<T> = std::result::Result<T, Error>;
