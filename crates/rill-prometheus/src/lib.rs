//! Prometheus backend for rill scheduler metrics.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use rill_core::MetricsHandle;
//! use rill_prometheus::{PrometheusMetrics, TextEncoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let handle: MetricsHandle = Arc::new(metrics.clone());
//! # let _ = handle;
//!
//! let text = TextEncoder::new().encode_to_string(&metrics.gather())?;
//! # let _ = text;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `rill_polls_total{instance, task, outcome}` - Counter
//! - `rill_poll_duration_seconds{instance, task}` - Histogram
//! - `rill_task_restarts_total{instance, task}` - Counter
//! - `rill_instance_transitions_total{instance, state}` - Counter
//!
//! No `/metrics` endpoint is served here; expose [`PrometheusMetrics::gather`]
//! through whatever HTTP stack the host already runs.

mod backend;
pub use backend::PrometheusMetrics;
mod error;
pub use error::MetricsError;

pub use prometheus::{Encoder, Registry, TextEncoder};
