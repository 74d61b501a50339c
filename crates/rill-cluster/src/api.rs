use std::{collections::BTreeSet, sync::Arc, time::Duration};

use rill_model::{InstanceName, TaskName};
use tracing::{info, instrument};

use crate::{
    broadcast::{Aggregated, BroadcastController},
    error::ClusterError,
    ops::{
        ChangePeriod, ChangePeriodRequest, Lifecycle, LifecycleCommand, LifecycleRequest,
        ListInstances, ListInstancesRequest, PeriodOutcome,
    },
    transport::Transport,
};

/// Operator entry points for cluster-wide instance control.
///
/// Each call is one broadcast. "Nothing matched" becomes [`ClusterError::NotFound`]
/// when every node answered and [`ClusterError::Incomplete`] when some did not.
pub struct ControlApi {
    list: BroadcastController<ListInstances>,
    period: BroadcastController<ChangePeriod>,
    lifecycle: BroadcastController<Lifecycle>,
}

impl ControlApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            list: BroadcastController::new(ListInstances, Arc::clone(&transport)),
            period: BroadcastController::new(ChangePeriod, Arc::clone(&transport)),
            lifecycle: BroadcastController::new(Lifecycle, transport),
        }
    }

    /// Every instance name hosted by a node that answered.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_instances(&self) -> Result<BTreeSet<InstanceName>, ClusterError> {
        let agg = self.list.execute(ListInstancesRequest::default()).await?;
        if !agg.is_complete() {
            info!(failed = agg.failures.len(), "instance list is partial");
        }
        Ok(agg.outcome)
    }

    /// Change the period of `tasks` on `instance`.
    ///
    /// `None` or an empty list succeeds as long as the instance exists.
    /// A hosting node that found the instance but failed to apply the change
    /// yields [`ClusterError::Rejected`].
    #[instrument(level = "debug", skip(self, tasks))]
    pub async fn change_period(
        &self,
        instance: &str,
        tasks: Option<Vec<TaskName>>,
        period: Duration,
    ) -> Result<(), ClusterError> {
        let req = ChangePeriodRequest::new(instance.trim(), tasks, period);
        self.submit_period(req).await
    }

    /// [`ControlApi::change_period`] from raw operator input.
    pub async fn change_period_raw(
        &self,
        instance: &str,
        tasks: &str,
        period: &str,
    ) -> Result<(), ClusterError> {
        let req = ChangePeriodRequest::parse(instance, tasks, period)?;
        self.submit_period(req).await
    }

    pub async fn stop_instance(&self, instance: &str) -> Result<(), ClusterError> {
        self.lifecycle(instance, LifecycleCommand::Stop).await
    }

    pub async fn restart_instance(&self, instance: &str) -> Result<(), ClusterError> {
        self.lifecycle(instance, LifecycleCommand::Restart).await
    }

    async fn submit_period(&self, req: ChangePeriodRequest) -> Result<(), ClusterError> {
        let instance = req.instance.clone();
        let agg = self.period.execute(req).await?;
        match agg.outcome {
            PeriodOutcome::Changed => {
                info!(instance = %instance, "period changed");
                Ok(())
            }
            PeriodOutcome::Failed => {
                let detail = agg
                    .responses
                    .iter()
                    .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.node)))
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(ClusterError::Rejected(format!("instance '{instance}': {detail}")))
            }
            PeriodOutcome::TaskNotFound => Err(not_found(
                &agg,
                format!("no task of instance '{instance}' matched"),
            )),
            PeriodOutcome::InstanceNotFound => {
                Err(not_found(&agg, format!("instance '{instance}' not found")))
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn lifecycle(&self, instance: &str, command: LifecycleCommand) -> Result<(), ClusterError> {
        let req = LifecycleRequest {
            instance: instance.trim().to_string(),
            command,
        };
        let agg = self.lifecycle.execute(req).await?;
        if agg.outcome {
            Ok(())
        } else {
            Err(not_found(&agg, format!("instance '{}' not found", instance.trim())))
        }
    }
}

fn not_found<R, T>(agg: &Aggregated<R, T>, what: String) -> ClusterError {
    if agg.is_complete() {
        ClusterError::NotFound(what)
    } else {
        ClusterError::Incomplete {
            failed: agg.failures.len(),
            detail: format!("{what} on reachable nodes; {}", agg.failure_detail()),
        }
    }
}
