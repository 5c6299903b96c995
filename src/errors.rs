// src/errors.rs

//! Crate-wide error types.
//!
//! [`DevdagError`] covers configuration and plumbing failures. Failures that
//! happen while executing a single task are modelled by [`TaskError`] and
//! never escape the executor; they are reported through notifications and
//! turned into a terminal task status instead.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevdagError>;

/// Failure reported by a text generation backend.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("failed to start generator: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("generator exited with status {code}: {stderr}")]
    Upstream { code: i32, stderr: String },

    #[error("generator stream failed: {0}")]
    Stream(String),
}

/// Classified failure of a single task execution.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("content error: {0}")]
    Content(String),

    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("unsupported agent type '{0}'")]
    UnknownAgentType(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Tag attached to failure notifications so observers can tell failures apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generation,
    Content,
    Persistence,
    UnknownAgentType,
    Unexpected,
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Generation(_) => ErrorKind::Generation,
            TaskError::Content(_) => ErrorKind::Content,
            TaskError::Persistence { .. } => ErrorKind::Persistence,
            TaskError::UnknownAgentType(_) => ErrorKind::UnknownAgentType,
            TaskError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}
