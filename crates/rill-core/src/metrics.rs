use std::{sync::Arc, time::Duration};

use crate::instance::InstanceState;

/// Result of one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Payload fetched and stored.
    Stored,
    /// The source failed; nothing was stored.
    FetchFailed,
    /// The payload was fetched but the sink refused it.
    StoreFailed,
}

impl PollOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            PollOutcome::Stored => "stored",
            PollOutcome::FetchFailed => "fetch_failed",
            PollOutcome::StoreFailed => "store_failed",
        }
    }
}

/// Receiver of scheduler measurements.
///
/// Implementations must be cheap and non-blocking; they are called from polling loops.
pub trait MetricsBackend: Send + Sync + 'static {
    fn record_poll(&self, instance: &str, task: &str, outcome: PollOutcome, elapsed: Duration);

    fn record_task_restart(&self, instance: &str, task: &str);

    fn record_transition(&self, instance: &str, state: InstanceState);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

/// Backend that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn record_poll(&self, _: &str, _: &str, _: PollOutcome, _: Duration) {}

    fn record_task_restart(&self, _: &str, _: &str) {}

    fn record_transition(&self, _: &str, _: InstanceState) {}
}

pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
