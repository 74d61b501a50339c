mod state;
pub use state::InstanceState;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use rill_model::{ConnectionSettings, InstanceSettings, TaskName};
use serde_json::Value;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, timeout, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    collab::{SettingsLoader, Sink, Source},
    config::ManagerConfig,
    error::CoreError,
    metrics::{MetricsHandle, noop_metrics},
    registry::InstanceRegistry,
    router::SourceRouter,
    task::{PollingTask, TaskContext},
};

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    state: InstanceState,
    connection: Option<ConnectionSettings>,
    source: Option<Arc<dyn Source>>,
    tasks: BTreeMap<TaskName, Arc<PollingTask>>,
    workers: HashMap<TaskName, Worker>,
    last_doc: Option<Value>,
}

/// A named bundle of polling tasks sharing one source connection.
///
/// Lifecycle and task-control operations are serialized by a per-instance lock;
/// the `closed` flag can be read without it.
pub struct ManagedInstance {
    name: Arc<str>,
    registry: InstanceRegistry,
    router: Arc<SourceRouter>,
    sink: Arc<dyn Sink>,
    loader: Option<Arc<dyn SettingsLoader>>,
    metrics: MetricsHandle,
    config: ManagerConfig,
    shutdown: CancellationToken,
    closed: AtomicBool,
    inner: Mutex<Inner>,
}

/// Builder for [`ManagedInstance`].
pub struct ManagedInstanceBuilder {
    name: Arc<str>,
    registry: InstanceRegistry,
    router: Arc<SourceRouter>,
    sink: Arc<dyn Sink>,
    loader: Option<Arc<dyn SettingsLoader>>,
    metrics: MetricsHandle,
    config: ManagerConfig,
    shutdown: CancellationToken,
}

impl ManagedInstanceBuilder {
    /// Settings loader consulted by `reconfigure` and `restart`.
    pub fn with_loader(mut self, loader: Arc<dyn SettingsLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Process-wide shutdown token. Cancelling it cancels every task loop and
    /// interrupts a pending restart.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn build(self) -> Arc<ManagedInstance> {
        Arc::new(ManagedInstance {
            name: self.name,
            registry: self.registry,
            router: self.router,
            sink: self.sink,
            loader: self.loader,
            metrics: self.metrics,
            config: self.config,
            shutdown: self.shutdown,
            closed: AtomicBool::new(true),
            inner: Mutex::new(Inner::default()),
        })
    }
}

impl ManagedInstance {
    pub fn builder(
        name: impl Into<String>,
        registry: InstanceRegistry,
        router: Arc<SourceRouter>,
        sink: Arc<dyn Sink>,
    ) -> ManagedInstanceBuilder {
        let name: String = name.into();
        ManagedInstanceBuilder {
            name: Arc::from(name.trim()),
            registry,
            router,
            sink,
            loader: None,
            metrics: noop_metrics(),
            config: ManagerConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` unless the instance is running.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn state(&self) -> InstanceState {
        self.inner.lock().await.state
    }

    /// Kind of the configured connection, if any.
    pub async fn connection_kind(&self) -> Option<&'static str> {
        self.inner.lock().await.connection.as_ref().map(|c| c.kind())
    }

    /// Configured tasks, ordered by name.
    pub async fn tasks(&self) -> Vec<Arc<PollingTask>> {
        self.inner.lock().await.tasks.values().cloned().collect()
    }

    pub async fn task(&self, name: &str) -> Option<Arc<PollingTask>> {
        self.inner.lock().await.tasks.get(name.trim()).cloned()
    }

    /// Number of task loops that have not terminated yet.
    pub async fn active_workers(&self) -> usize {
        self.inner
            .lock()
            .await
            .workers
            .values()
            .filter(|w| !w.handle.is_finished())
            .count()
    }

    /// Replace connection and tasks from a settings document.
    ///
    /// Nothing changes when the document is rejected.
    #[instrument(level = "debug", skip_all, fields(instance = %self.name))]
    pub async fn configure(&self, doc: &Value) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        self.configure_locked(&mut inner, doc)
    }

    /// Re-read settings from the loader (or reuse the last document) and configure.
    #[instrument(level = "debug", skip_all, fields(instance = %self.name))]
    pub async fn reconfigure(&self) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        self.reconfigure_locked(&mut inner).await
    }

    /// Register, open the source and launch one loop per task.
    #[instrument(level = "debug", skip_all, fields(instance = %self.name))]
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner).await
    }

    /// Stop every task loop and close the source. Idempotent.
    ///
    /// The registry entry is kept.
    #[instrument(level = "debug", skip_all, fields(instance = %self.name))]
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
    }

    /// Stop and leave the registry.
    pub async fn close(self: &Arc<Self>) {
        self.stop().await;
        if self.registry.remove_if_same(self) {
            info!(instance = %self.name, "instance unregistered");
        }
    }

    /// Stop (when running), settle, re-read settings and start again.
    ///
    /// Returns [`CoreError::Interrupted`] without starting when shutdown fires
    /// during the settle delay.
    #[instrument(level = "debug", skip_all, fields(instance = %self.name))]
    pub async fn restart(self: &Arc<Self>) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        if inner.state == InstanceState::Running {
            self.stop_locked(&mut inner).await;
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    warn!(instance = %self.name, "restart interrupted by shutdown");
                    return Err(CoreError::Interrupted);
                }
                _ = tokio::time::sleep(self.config.restart_delay()) => {}
            }
        }
        self.reconfigure_locked(&mut inner).await?;
        self.start_locked(&mut inner).await
    }

    /// Set the period of every named task and return whether any was found.
    ///
    /// A running task whose period drops from above the long-period threshold is
    /// restarted at once instead of finishing its current long sleep.
    /// `None` or an empty list changes nothing and reports success.
    ///
    /// Every named task gets the new period even when a restart times out; the
    /// first [`CoreError::TaskRestartTimeout`] is returned after all names are applied.
    #[instrument(level = "debug", skip(self, names), fields(instance = %self.name))]
    pub async fn change_task_period(
        &self,
        names: Option<&[String]>,
        period: Duration,
    ) -> Result<bool, CoreError> {
        let Some(names) = names.filter(|n| !n.is_empty()) else {
            return Ok(true);
        };
        if period.is_zero() {
            return Err(CoreError::InvalidArgument("period must be greater than zero".into()));
        }

        let mut inner = self.inner.lock().await;
        let mut found = false;
        let mut failed = None;
        for name in names.iter().map(|n| n.trim()) {
            let Some(task) = inner.tasks.get(name).cloned() else {
                debug!(instance = %self.name, task = name, "no such task");
                continue;
            };
            found = true;

            let prev = task.set_period(period);
            info!(
                instance = %self.name,
                task = name,
                prev_ms = prev.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "task period changed"
            );

            let active = inner.state == InstanceState::Running
                && !task.is_closed()
                && inner.workers.get(name).is_some_and(|w| !w.handle.is_finished());
            if active
                && prev > self.config.long_period()
                && period < prev
                && let Err(e) = self.restart_task_locked(&mut inner, &task).await
                && failed.is_none()
            {
                failed = Some(e);
            }
        }
        match failed {
            Some(e) => Err(e),
            None => Ok(found),
        }
    }

    fn configure_locked(&self, inner: &mut Inner, doc: &Value) -> Result<(), CoreError> {
        if !inner.state.accepts_settings() {
            return Err(CoreError::IllegalState(
                "can't configure running instance".into(),
            ));
        }

        let settings = InstanceSettings::from_value(doc)?;
        let source = self.router.build(&settings.connection)?;
        let tasks = settings
            .tasks
            .into_iter()
            .map(|def| (def.name.clone(), Arc::new(PollingTask::new(def))))
            .collect::<BTreeMap<_, _>>();

        info!(
            instance = %self.name,
            connection = settings.connection.kind(),
            tasks = tasks.len(),
            "instance configured"
        );
        inner.connection = Some(settings.connection);
        inner.source = Some(source);
        inner.tasks = tasks;
        inner.workers.clear();
        inner.last_doc = Some(doc.clone());
        self.transition(inner, InstanceState::Configured);
        Ok(())
    }

    async fn reconfigure_locked(&self, inner: &mut Inner) -> Result<(), CoreError> {
        if !inner.state.accepts_settings() {
            return Err(CoreError::IllegalState(
                "can't reconfigure running instance".into(),
            ));
        }
        let doc = match &self.loader {
            Some(loader) => loader.load(&self.name).await?,
            None => inner.last_doc.clone().ok_or_else(|| {
                CoreError::IllegalState("instance has never been configured".into())
            })?,
        };
        self.configure_locked(inner, &doc)
    }

    async fn start_locked(self: &Arc<Self>, inner: &mut Inner) -> Result<(), CoreError> {
        match inner.state {
            InstanceState::Running => {
                return Err(CoreError::IllegalState(
                    "can't start already running instance".into(),
                ));
            }
            InstanceState::Unconfigured => {
                return Err(CoreError::IllegalState(
                    "can't start unconfigured instance".into(),
                ));
            }
            InstanceState::Configured | InstanceState::Stopped => {}
        }
        let source = inner
            .source
            .clone()
            .ok_or_else(|| CoreError::IllegalState("instance has no source".into()))?;

        if let Some(prev) = self.registry.add(Arc::clone(self))
            && !Arc::ptr_eq(&prev, self)
        {
            warn!(instance = %self.name, "replaced another instance registered under the same name");
        }
        source.start().await?;

        self.closed.store(false, Ordering::Release);
        let workers: HashMap<TaskName, Worker> = inner
            .tasks
            .values()
            .map(|task| (task.name().to_string(), self.spawn_worker(task, &source)))
            .collect();
        inner.workers = workers;
        self.transition(inner, InstanceState::Running);
        info!(instance = %self.name, tasks = inner.tasks.len(), "instance started");
        Ok(())
    }

    async fn stop_locked(&self, inner: &mut Inner) {
        self.closed.store(true, Ordering::Release);
        if inner.state != InstanceState::Running {
            return;
        }
        for task in inner.tasks.values() {
            task.close();
        }

        let grace = self.config.grace();
        let deadline = Instant::now() + grace;
        let mut lingering = Vec::new();
        for (name, mut worker) in inner.workers.drain() {
            if timeout_at(deadline, &mut worker.handle).await.is_err() {
                lingering.push((name, worker));
            }
        }

        for (_, worker) in &lingering {
            worker.cancel.cancel();
        }
        for (name, mut worker) in lingering {
            debug!(instance = %self.name, task = %name, "task still alive after grace period; cancelled");
            if timeout(grace, &mut worker.handle).await.is_err() {
                warn!(instance = %self.name, task = %name, "task ignored cancellation; aborting");
                worker.handle.abort();
                if let Some(task) = inner.tasks.get(&name) {
                    task.close();
                }
            }
        }

        if let Some(source) = &inner.source {
            source.close().await;
        }
        self.transition(inner, InstanceState::Stopped);
        info!(instance = %self.name, "instance stopped");
    }

    async fn restart_task_locked(
        &self,
        inner: &mut Inner,
        task: &Arc<PollingTask>,
    ) -> Result<(), CoreError> {
        let Some(mut worker) = inner.workers.remove(task.name()) else {
            return Ok(());
        };
        task.close();
        worker.cancel.cancel();

        let wait = self.config.task_restart_timeout();
        if timeout(wait, &mut worker.handle).await.is_err() {
            worker.handle.abort();
            warn!(instance = %self.name, task = task.name(), "task did not terminate; not relaunched");
            return Err(CoreError::TaskRestartTimeout {
                task: task.name().to_string(),
                waited_ms: wait.as_millis() as u64,
            });
        }

        let source = inner
            .source
            .clone()
            .ok_or_else(|| CoreError::IllegalState("instance has no source".into()))?;
        let worker = self.spawn_worker(task, &source);
        inner.workers.insert(task.name().to_string(), worker);
        self.metrics.record_task_restart(&self.name, task.name());
        info!(instance = %self.name, task = task.name(), "task restarted with new period");
        Ok(())
    }

    fn spawn_worker(&self, task: &Arc<PollingTask>, source: &Arc<dyn Source>) -> Worker {
        let cancel = self.shutdown.child_token();
        let ctx = TaskContext {
            instance: Arc::clone(&self.name),
            source: Arc::clone(source),
            sink: Arc::clone(&self.sink),
            metrics: Arc::clone(&self.metrics),
        };
        let handle = task.spawn(ctx, cancel.clone());
        Worker { cancel, handle }
    }

    fn transition(&self, inner: &mut Inner, to: InstanceState) {
        debug!(instance = %self.name, from = %inner.state, to = %to, "state transition");
        inner.state = to;
        self.metrics.record_transition(&self.name, to);
    }
}

impl std::fmt::Debug for ManagedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedInstance")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
