use thiserror::Error;

/// Top-level error type for the Varlens client.
///
/// Subsystem crates define their own error types for recoverable,
/// component-local conditions (`LoadError`, `ChatError`) and convert into
/// `VarlensError` only where a failure has to cross into the host.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VarlensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session error: {0}")]
    Session(String),
}

impl From<toml::de::Error> for VarlensError {
    fn from(err: toml::de::Error) -> Self {
        VarlensError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VarlensError {
    fn from(err: toml::ser::Error) -> Self {
        VarlensError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VarlensError {
    fn from(err: serde_json::Error) -> Self {
        VarlensError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Varlens operations.
pub type Result<T> = std::result::Result<T, VarlensError>;
