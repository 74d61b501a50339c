use thiserror::Error;

/// Errors raised while turning a settings document into typed definitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("'{0}' element of settings structure not found")]
    Missing(String),
    #[error("'{0}' element of settings structure not found or is empty")]
    MissingOrEmpty(String),
    #[error("invalid duration '{value}' for setting '{key}'")]
    Duration { key: String, value: String },
    #[error("{0}")]
    Invalid(String),
}
