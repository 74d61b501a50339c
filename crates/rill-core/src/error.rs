use rill_model::{InfoType, SettingsError};
use thiserror::Error;

/// Errors surfaced by instance lifecycle and task-control operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(#[from] SettingsError),

    #[error("no source builder for connection kind '{0}'")]
    NoSourceBuilder(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("settings could not be loaded: {0}")]
    SettingsLoad(String),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("task '{task}' did not terminate within {waited_ms}ms")]
    TaskRestartTimeout { task: String, waited_ms: u64 },

    #[error("operation interrupted")]
    Interrupted,
}

impl CoreError {
    /// Returns `true` for errors caused by bad or missing settings.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::Configuration(_) | CoreError::NoSourceBuilder(_) | CoreError::SettingsLoad(_)
        )
    }
}

/// Failure reported by a source collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported information type: {0}")]
    Unsupported(InfoType),
    #[error("invalid connection settings: {0}")]
    InvalidSettings(String),
    #[error("cancelled")]
    Cancelled,
}

/// Failure reported by a sink collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("store into {target} failed: {reason}")]
    Store { target: String, reason: String },
}
