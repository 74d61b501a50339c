use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::{error::LoggerError, format::LoggerFormat};

/// Environment variable selecting the output format.
pub const FORMAT_ENV: &str = "RILL_LOG_FORMAT";
/// Environment variable holding the filter directives, e.g. `info,rill_core=debug`.
pub const LEVEL_ENV: &str = "RILL_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directives.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: cfg!(test) || std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by `RILL_LOG_FORMAT` and `RILL_LOG`.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(format) = lookup(FORMAT_ENV).filter(|v| !v.trim().is_empty()) {
            cfg.format = format.parse()?;
        }
        if let Some(level) = lookup(LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            cfg.level = level.trim().to_string();
        }
        if cfg.format != LoggerFormat::Text {
            cfg.use_color = false;
        }
        Ok(cfg)
    }
}
