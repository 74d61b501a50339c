use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use rill_model::{InfoType, TargetLocation, TaskDef, TaskParams};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    collab::{Sink, Source},
    error::{SinkError, SourceError},
    metrics::{MetricsHandle, PollOutcome},
};

/// Everything a polling loop needs besides its own definition.
#[derive(Clone)]
pub struct TaskContext {
    pub instance: Arc<str>,
    pub source: Arc<dyn Source>,
    pub sink: Arc<dyn Sink>,
    pub metrics: MetricsHandle,
}

enum PollFailure {
    Fetch(SourceError),
    Store(SinkError),
}

/// One periodic fetch-and-store unit.
///
/// `period` and `closed` are atomics: the loop reads them every cycle while
/// control operations write them from other tasks.
#[derive(Debug)]
pub struct PollingTask {
    name: String,
    info_type: InfoType,
    params: TaskParams,
    target: TargetLocation,
    period_ms: AtomicU64,
    closed: AtomicBool,
}

impl PollingTask {
    /// Create a closed task from its definition.
    pub fn new(def: TaskDef) -> Self {
        Self {
            name: def.name,
            info_type: def.info_type,
            params: def.params,
            target: def.target,
            period_ms: AtomicU64::new(to_millis(def.period)),
            closed: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info_type(&self) -> InfoType {
        self.info_type
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    pub fn target(&self) -> &TargetLocation {
        &self.target
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(Ordering::Acquire))
    }

    /// Set a new period and return the previous one.
    ///
    /// Periods are kept at millisecond resolution and never drop below 1ms.
    pub fn set_period(&self, period: Duration) -> Duration {
        let prev = self.period_ms.swap(to_millis(period), Ordering::AcqRel);
        Duration::from_millis(prev)
    }

    /// `true` once the loop has exited or has been asked to.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Ask the loop to exit after its current step. Idempotent.
    ///
    /// Does not interrupt an in-flight fetch; cancel the loop's token for that.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Launch the loop on its own tokio task.
    pub fn spawn(
        self: &Arc<Self>,
        ctx: TaskContext,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let task = Arc::clone(self);
        tokio::spawn(async move { task.run(&ctx, &cancel).await })
    }

    /// Run the polling loop until the task is closed or `cancel` fires.
    ///
    /// Source and sink errors are logged and the loop carries on.
    /// The closed flag is set as the very last step, however the loop ends.
    pub async fn run(&self, ctx: &TaskContext, cancel: &CancellationToken) {
        info!(instance = %ctx.instance, task = %self.name, "polling task started");
        self.closed.store(false, Ordering::Release);

        loop {
            if self.is_closed() || cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                step = self.poll_once(ctx) => step,
            };
            let outcome = match step {
                Ok(()) => PollOutcome::Stored,
                Err(PollFailure::Fetch(SourceError::Cancelled)) => break,
                Err(PollFailure::Fetch(e)) => {
                    error!(instance = %ctx.instance, task = %self.name, error = %e, "failed to fetch payload");
                    PollOutcome::FetchFailed
                }
                Err(PollFailure::Store(e)) => {
                    error!(instance = %ctx.instance, task = %self.name, error = %e, "failed to store payload");
                    PollOutcome::StoreFailed
                }
            };
            ctx.metrics
                .record_poll(&ctx.instance, &self.name, outcome, started.elapsed());

            if self.is_closed() {
                break;
            }
            let wait = self.period().saturating_sub(started.elapsed());
            if wait.is_zero() {
                warn!(instance = %ctx.instance, task = %self.name, "cycle overran its period; polling again immediately");
                continue;
            }
            debug!(instance = %ctx.instance, task = %self.name, wait_ms = wait.as_millis() as u64, "sleeping until next cycle");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(instance = %ctx.instance, task = %self.name, "polling task stopped");
        self.closed.store(true, Ordering::Release);
    }

    async fn poll_once(&self, ctx: &TaskContext) -> Result<(), PollFailure> {
        let payload = ctx
            .source
            .fetch(self.info_type, &self.params)
            .await
            .map_err(PollFailure::Fetch)?;
        ctx.sink
            .store(&self.target, payload)
            .await
            .map_err(PollFailure::Store)
    }
}

fn to_millis(period: Duration) -> u64 {
    u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::noop_metrics;
    use crate::testkit::{RecordingSink, ScriptedSource, task_def};

    fn ctx(source: ScriptedSource, sink: &Arc<RecordingSink>) -> TaskContext {
        TaskContext {
            instance: Arc::from("test-instance"),
            source: Arc::new(source),
            sink: sink.clone(),
            metrics: noop_metrics(),
        }
    }

    #[test]
    fn new_task_is_closed_with_configured_period() {
        let task = PollingTask::new(task_def("ch", 5_000));
        assert!(task.is_closed());
        assert_eq!(task.period(), Duration::from_millis(5_000));
        assert_eq!(task.target().index, "idx");
    }

    #[test]
    fn set_period_returns_previous_and_never_drops_to_zero() {
        let task = PollingTask::new(task_def("ch", 5_000));
        assert_eq!(task.set_period(Duration::from_millis(1_000)), Duration::from_millis(5_000));
        assert_eq!(task.period(), Duration::from_millis(1_000));

        task.set_period(Duration::ZERO);
        assert_eq!(task.period(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stores_once_per_period() {
        let sink = Arc::new(RecordingSink::default());
        let task = Arc::new(PollingTask::new(task_def("ch", 1_000)));
        let cancel = CancellationToken::new();
        let handle = task.spawn(ctx(ScriptedSource::ok("{\"status\":\"green\"}"), &sink), cancel.clone());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(!task.is_closed());
        assert_eq!(sink.count(), 4);
        assert_eq!(sink.gaps(), vec![Duration::from_millis(1_000); 3]);
        assert_eq!(sink.records()[0].1, "{\"status\":\"green\"}");

        cancel.cancel();
        handle.await.unwrap();
        assert!(task.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_stop_the_loop() {
        let sink = Arc::new(RecordingSink::default());
        let task = Arc::new(PollingTask::new(task_def("ch", 100)));
        let cancel = CancellationToken::new();
        let source = ScriptedSource::failing_first(2, "{}");
        let handle = task.spawn(ctx(source, &sink), cancel.clone());

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(sink.count(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sink_errors_do_not_stop_the_loop() {
        let sink = Arc::new(RecordingSink::failing_first(1));
        let task = Arc::new(PollingTask::new(task_def("ch", 100)));
        let cancel = CancellationToken::new();
        let handle = task.spawn(ctx(ScriptedSource::ok("{}"), &sink), cancel.clone());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(sink.count(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_runs_back_to_back_without_catch_up() {
        let sink = Arc::new(RecordingSink::default());
        let task = Arc::new(PollingTask::new(task_def("ch", 100)));
        let cancel = CancellationToken::new();
        let source = ScriptedSource::ok("{}").with_latency(Duration::from_millis(300));
        let handle = task.spawn(ctx(source, &sink), cancel.clone());

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(sink.count(), 3);
        assert!(sink.gaps().iter().all(|g| *g == Duration::from_millis(300)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn close_lets_the_loop_exit_after_current_sleep_check() {
        let sink = Arc::new(RecordingSink::default());
        let task = Arc::new(PollingTask::new(task_def("ch", 50)));
        let handle = task.spawn(ctx(ScriptedSource::ok("{}"), &sink), CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(10)).await;
        task.close();
        task.close();
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("loop exits after close")
            .unwrap();
        assert!(task.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_blocked_fetch() {
        let sink = Arc::new(RecordingSink::default());
        let task = Arc::new(PollingTask::new(task_def("ch", 50)));
        let cancel = CancellationToken::new();
        let source = ScriptedSource::ok("{}").with_latency(Duration::from_secs(3_600));
        let handle = task.spawn(ctx(source, &sink), cancel.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_closed());

        cancel.cancel();
        handle.await.unwrap();
        assert!(task.is_closed());
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lengthened_period_applies_on_next_cycle() {
        let sink = Arc::new(RecordingSink::default());
        let task = Arc::new(PollingTask::new(task_def("ch", 500)));
        let cancel = CancellationToken::new();
        let handle = task.spawn(ctx(ScriptedSource::ok("{}"), &sink), cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.set_period(Duration::from_millis(1_500));
        tokio::time::sleep(Duration::from_millis(3_000)).await;

        let gaps = sink.gaps();
        assert_eq!(gaps[0], Duration::from_millis(500));
        assert!(gaps[1..].iter().all(|g| *g == Duration::from_millis(1_500)));

        cancel.cancel();
        handle.await.unwrap();
    }
}
