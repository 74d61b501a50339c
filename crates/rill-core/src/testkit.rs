//! In-memory collaborators for exercising instances and polling loops.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rill_model::{ConnectionSettings, InfoType, TargetLocation, TaskDef, TaskParams};
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use crate::{
    collab::{Sink, Source},
    error::{SinkError, SourceError},
    router::{SourceBuilder, SourceRouter},
};

#[derive(Debug, Default)]
struct SourceCounters {
    fetches: AtomicUsize,
    starts: AtomicUsize,
    closes: AtomicUsize,
}

/// Source returning a fixed payload, optionally after a delay or a number of failures.
///
/// Clones share counters.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    payload: String,
    latency: Duration,
    blocking: Duration,
    fail_first: usize,
    fail_start: bool,
    counters: Arc<SourceCounters>,
}

impl ScriptedSource {
    pub fn ok(payload: &str) -> Self {
        Self {
            payload: payload.to_string(),
            latency: Duration::ZERO,
            blocking: Duration::ZERO,
            fail_first: 0,
            fail_start: false,
            counters: Arc::default(),
        }
    }

    /// The first `n` fetches fail, later ones return `payload`.
    pub fn failing_first(n: usize, payload: &str) -> Self {
        Self {
            fail_first: n,
            ..Self::ok(payload)
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every fetch holds its thread for `blocking` before yielding, so
    /// cancellation cannot reach it. Needs a multi-thread runtime.
    pub fn with_blocking_fetch(mut self, blocking: Duration) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn fetches(&self) -> usize {
        self.counters.fetches.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn start(&self) -> Result<(), SourceError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(SourceError::Unavailable("scripted start failure".into()));
        }
        Ok(())
    }

    async fn fetch(&self, _info_type: InfoType, _params: &TaskParams) -> Result<String, SourceError> {
        let n = self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.blocking.is_zero() {
            std::thread::sleep(self.blocking);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if n < self.fail_first {
            return Err(SourceError::Fetch(format!("scripted failure #{}", n + 1)));
        }
        Ok(self.payload.clone())
    }

    async fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builder handing out clones of one [`ScriptedSource`] for local and rest connections.
pub struct ScriptedBuilder(pub ScriptedSource);

impl SourceBuilder for ScriptedBuilder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, conn: &ConnectionSettings) -> bool {
        matches!(conn, ConnectionSettings::Local | ConnectionSettings::Rest { .. })
    }

    fn build(&self, _conn: &ConnectionSettings) -> Result<Arc<dyn Source>, SourceError> {
        Ok(Arc::new(self.0.clone()))
    }
}

/// Router with a single [`ScriptedBuilder`].
pub fn scripted_router(source: &ScriptedSource) -> Arc<SourceRouter> {
    Arc::new(SourceRouter::new().with(Arc::new(ScriptedBuilder(source.clone()))))
}

/// One stored payload: target, payload and the (tokio) instant it arrived.
pub type Record = (TargetLocation, String, Instant);

/// Sink keeping every stored payload in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Record>>,
    fail_first: usize,
    attempts: AtomicUsize,
}

impl RecordingSink {
    /// The first `n` stores fail and are not recorded.
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<(TargetLocation, String)> {
        self.lock()
            .iter()
            .map(|(t, p, _)| (t.clone(), p.clone()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Stores recorded for the target index `index`.
    pub fn count_for(&self, index: &str) -> usize {
        self.lock().iter().filter(|(t, _, _)| t.index == index).count()
    }

    /// Intervals between consecutive stores.
    pub fn gaps(&self) -> Vec<Duration> {
        self.instants().windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Intervals between consecutive stores for one target index.
    pub fn gaps_for(&self, index: &str) -> Vec<Duration> {
        let at: Vec<Instant> = self
            .lock()
            .iter()
            .filter(|(t, _, _)| t.index == index)
            .map(|(_, _, at)| *at)
            .collect();
        at.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Arrival instants of every store.
    pub fn instants(&self) -> Vec<Instant> {
        self.lock().iter().map(|(_, _, at)| *at).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn store(&self, target: &TargetLocation, payload: String) -> Result<(), SinkError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(SinkError::Store {
                target: target.to_string(),
                reason: "scripted failure".into(),
            });
        }
        self.lock().push((target.clone(), payload, Instant::now()));
        Ok(())
    }
}

/// Task definition storing into `idx/doc` every `period_ms`.
pub fn task_def(name: &str, period_ms: u64) -> TaskDef {
    TaskDef {
        name: name.to_string(),
        info_type: InfoType::ClusterHealth,
        target: TargetLocation::new("idx", "doc"),
        period: Duration::from_millis(period_ms),
        params: TaskParams::new(),
    }
}

/// Settings document with a local connection and one task per `(name, period_ms)`.
///
/// Each task stores into an index named after the task.
pub fn settings_doc(tasks: &[(&str, u64)]) -> Value {
    let tasks: Map<String, Value> = tasks
        .iter()
        .map(|(name, period)| {
            (
                name.to_string(),
                json!({
                    "info_type": "cluster_health",
                    "target_index": name.trim(),
                    "target_type": "doc",
                    "period": period,
                }),
            )
        })
        .collect();
    json!({ "connection": { "type": "local" }, "tasks": tasks })
}
