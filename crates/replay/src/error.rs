//! Error types for the replay engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Boundary closed: the hosted document is no longer listening")]
    BoundaryClosed,

    #[error("Evaluator error: {0}")]
    Evaluator(String),

    #[error("Evaluator returned status {status}: {body}")]
    EvaluatorStatus { status: u16, body: String },

    #[error("Evaluator not configured: {0}")]
    EvaluatorNotConfigured(String),

    #[error("An audit is already in progress")]
    AuditInProgress,

    #[error("A remediation is already in progress")]
    RemediationInProgress,

    #[error("Playback is still running; wait for it to finish or start a new audit")]
    PlaybackActive,

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] prototrace_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ReplayResult<T> = Result<T, ReplayError>;
