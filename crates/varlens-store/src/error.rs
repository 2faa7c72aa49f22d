//! Error types for result loading.

use varlens_core::error::VarlensError;
use varlens_core::types::LoadFailure;

/// Errors from loading one store's results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("no data for this session")]
    NoData,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("decode error: {0}")]
    Decode(String),
}

impl LoadError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Transport(_) => true,
            LoadError::Status(code) => *code >= 500,
            LoadError::NoData | LoadError::Decode(_) => false,
        }
    }

    /// The failure recorded on a store that ends in `Error`.
    pub fn to_failure(&self) -> LoadFailure {
        match self {
            LoadError::NoData => LoadFailure::NoData,
            other => LoadFailure::Failed(other.to_string()),
        }
    }
}

impl From<LoadError> for VarlensError {
    fn from(err: LoadError) -> Self {
        VarlensError::Transport(err.to_string())
    }
}
