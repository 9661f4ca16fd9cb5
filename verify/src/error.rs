use giztoy_gmm::GmmError;
use thiserror::Error;

/// Errors returned by verification experiments.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Gmm(#[from] GmmError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
