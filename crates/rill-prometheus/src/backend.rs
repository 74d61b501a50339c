use std::time::Duration;

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, proto::MetricFamily};
use rill_core::{InstanceState, MetricsBackend, PollOutcome};

use crate::error::MetricsError;

const POLL_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// [`MetricsBackend`] recording into a Prometheus registry.
///
/// Clones share the registry and the collectors.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    polls: CounterVec,
    poll_duration: HistogramVec,
    task_restarts: CounterVec,
    transitions: CounterVec,
}

impl PrometheusMetrics {
    /// Backend with its own registry.
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_registry(Registry::new())
    }

    /// Backend registering its collectors into `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, MetricsError> {
        let polls = CounterVec::new(
            Opts::new("rill_polls_total", "Polling cycles by outcome"),
            &["instance", "task", "outcome"],
        )?;
        let poll_duration = HistogramVec::new(
            HistogramOpts::new("rill_poll_duration_seconds", "Fetch plus store time of one cycle")
                .buckets(POLL_BUCKETS.to_vec()),
            &["instance", "task"],
        )?;
        let task_restarts = CounterVec::new(
            Opts::new("rill_task_restarts_total", "Task loops relaunched after a period change"),
            &["instance", "task"],
        )?;
        let transitions = CounterVec::new(
            Opts::new("rill_instance_transitions_total", "Instance lifecycle transitions"),
            &["instance", "state"],
        )?;

        registry.register(Box::new(polls.clone()))?;
        registry.register(Box::new(poll_duration.clone()))?;
        registry.register(Box::new(task_restarts.clone()))?;
        registry.register(Box::new(transitions.clone()))?;

        Ok(Self {
            registry,
            polls,
            poll_duration,
            task_restarts,
            transitions,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_poll(&self, instance: &str, task: &str, outcome: PollOutcome, elapsed: Duration) {
        self.polls
            .with_label_values(&[instance, task, outcome.as_label()])
            .inc();
        self.poll_duration
            .with_label_values(&[instance, task])
            .observe(elapsed.as_secs_f64());
    }

    fn record_task_restart(&self, instance: &str, task: &str) {
        self.task_restarts.with_label_values(&[instance, task]).inc();
    }

    fn record_transition(&self, instance: &str, state: InstanceState) {
        self.transitions
            .with_label_values(&[instance, state.as_str()])
            .inc();
    }
}
