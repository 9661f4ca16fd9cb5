use thiserror::Error;

/// Errors returned by gmm operations.
#[derive(Debug, Error)]
pub enum GmmError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("empty data: {0}")]
    EmptyData(&'static str),

    #[error("degenerate input: dimension {dim} has zero or non-finite standard deviation")]
    Degenerate { dim: usize },

    #[error("persistence error for {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl GmmError {
    /// Builds a [`GmmError::Persistence`] for `path`.
    pub fn persistence(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
