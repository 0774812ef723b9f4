//! Error types for Prototrace

use thiserror::Error;

/// Result type alias using the Prototrace common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding audit data and boundary traffic
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid boundary message: {0}")]
    InvalidMessage(String),

    #[error("Incomplete audit result: missing {0}")]
    IncompleteAudit(&'static str),
}
