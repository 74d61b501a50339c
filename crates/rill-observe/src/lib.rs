//! Process-wide logging setup for rill binaries.
//!
//! Libraries only emit `tracing` events; a binary calls [`logger_init`] once.

mod config;
pub use config::LoggerConfig;
mod error;
pub use error::LoggerError;
mod format;
pub use format::LoggerFormat;
mod init;
pub use init::logger_init;
