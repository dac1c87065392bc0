//! Top-level error types for modelgate.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("duplicate model id in registry: {0}")]
    DuplicateModel(String),

    #[error("model entry has an empty {field}")]
    EmptyField { field: &'static str },

    #[error("unknown task category: {0}")]
    UnknownCategory(String),

    #[error("blacklist multiplier must be >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("primary provider must not be empty")]
    EmptyPrimaryProvider,

    #[error("no state path configured and no platform data directory is available")]
    NoStatePath,
}

/// Router-level errors surfaced to callers of the manager.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider name must not be empty")]
    EmptyProvider,

    #[error("model {0} is not registered")]
    UnknownModel(String),

    #[error("model {model} belongs to provider {expected}, not {given}")]
    ProviderMismatch {
        model: String,
        expected: String,
        given: String,
    },
}

/// Persisted selection errors. Only writes can fail; reads degrade to `None`.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state path {0} has no parent directory")]
    NoParent(PathBuf),

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize selection: {0}")]
    Serialize(#[from] serde_json::Error),
}
