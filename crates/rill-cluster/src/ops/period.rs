use std::time::Duration;

use async_trait::async_trait;
use rill_core::{CoreError, InstanceRegistry};
use rill_model::{InstanceName, NodeId, TaskName, parse_period, split_task_names};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{broadcast::Operation, error::ClusterError};

/// Change the polling period of named tasks of one instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangePeriod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePeriodRequest {
    pub instance: InstanceName,
    /// `None` addresses no task; the request then succeeds without changing anything.
    #[serde(default)]
    pub tasks: Option<Vec<TaskName>>,
    pub period_ms: u64,
}

impl ChangePeriodRequest {
    pub fn new(instance: impl Into<String>, tasks: Option<Vec<TaskName>>, period: Duration) -> Self {
        Self {
            instance: instance.into(),
            tasks,
            period_ms: u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Build from raw operator input: a comma-separated task list and a duration string.
    pub fn parse(instance: &str, tasks: &str, period: &str) -> Result<Self, ClusterError> {
        let period = parse_period(period)?;
        Ok(Self::new(instance.trim(), split_task_names(tasks), period))
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePeriodResponse {
    pub node: NodeId,
    pub instance_found: bool,
    pub task_found: bool,
    /// Set when the hosting node accepted the request but could not fully apply it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cluster-wide result of a period change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOutcome {
    /// At least one node changed at least one task.
    Changed,
    /// A node hosting the instance failed to apply the change.
    Failed,
    /// The instance exists but none of its tasks matched.
    TaskNotFound,
    /// No node hosts the instance.
    InstanceNotFound,
}

impl PeriodOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PeriodOutcome::Changed)
    }
}

#[async_trait]
impl Operation for ChangePeriod {
    const NAME: &'static str = "change_period";

    type Request = ChangePeriodRequest;
    type NodeResponse = NodePeriodResponse;
    type Output = PeriodOutcome;

    fn target<'r>(&self, req: &'r ChangePeriodRequest) -> Option<&'r str> {
        Some(&req.instance)
    }

    fn validate(&self, req: &ChangePeriodRequest) -> Result<(), ClusterError> {
        if req.period_ms == 0 {
            return Err(ClusterError::InvalidRequest(
                "period must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    async fn on_node(
        &self,
        req: &ChangePeriodRequest,
        registry: &InstanceRegistry,
        node: &NodeId,
    ) -> Result<NodePeriodResponse, ClusterError> {
        let Some(instance) = registry.lookup(req.instance.trim()) else {
            debug!(node = %node, instance = %req.instance, "instance not hosted here");
            return Ok(NodePeriodResponse {
                node: node.clone(),
                instance_found: false,
                task_found: false,
                error: None,
            });
        };
        let (task_found, error) = match instance
            .change_task_period(req.tasks.as_deref(), req.period())
            .await
        {
            Ok(found) => (found, None),
            Err(e) => {
                warn!(node = %node, instance = %req.instance, error = %e, "period change not fully applied");
                (matches!(e, CoreError::TaskRestartTimeout { .. }), Some(e.to_string()))
            }
        };
        Ok(NodePeriodResponse {
            node: node.clone(),
            instance_found: true,
            task_found,
            error,
        })
    }

    /// A hosting node's error wins over any success elsewhere.
    fn reduce(&self, responses: &[NodePeriodResponse]) -> PeriodOutcome {
        if responses.iter().any(|r| r.instance_found && r.error.is_some()) {
            PeriodOutcome::Failed
        } else if responses.iter().any(|r| r.instance_found && r.task_found) {
            PeriodOutcome::Changed
        } else if responses.iter().any(|r| r.instance_found) {
            PeriodOutcome::TaskNotFound
        } else {
            PeriodOutcome::InstanceNotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(node: &str, instance_found: bool, task_found: bool) -> NodePeriodResponse {
        NodePeriodResponse {
            node: NodeId::from(node),
            instance_found,
            task_found,
            error: None,
        }
    }

    #[test]
    fn found_if_any_node_found_instance_and_task() {
        let out = ChangePeriod.reduce(&[
            answer("n1", false, false),
            answer("n2", true, false),
            answer("n3", true, true),
        ]);
        assert_eq!(out, PeriodOutcome::Changed);
        assert!(out.is_found());
    }

    #[test]
    fn instance_missing_everywhere() {
        let out = ChangePeriod.reduce(&[answer("n1", false, false), answer("n2", false, false)]);
        assert_eq!(out, PeriodOutcome::InstanceNotFound);
        assert!(!out.is_found());
        assert_eq!(ChangePeriod.reduce(&[]), PeriodOutcome::InstanceNotFound);
    }

    #[test]
    fn instance_found_without_matching_task() {
        let out = ChangePeriod.reduce(&[answer("n1", true, false), answer("n2", false, false)]);
        assert_eq!(out, PeriodOutcome::TaskNotFound);
    }

    #[test]
    fn task_found_flag_alone_does_not_count() {
        let out = ChangePeriod.reduce(&[answer("n1", false, true)]);
        assert_eq!(out, PeriodOutcome::InstanceNotFound);
    }

    #[test]
    fn hosting_node_error_overrides_success_elsewhere() {
        let failed = NodePeriodResponse {
            error: Some("task 'ch' did not terminate within 100ms".into()),
            ..answer("n2", true, true)
        };
        let out = ChangePeriod.reduce(&[answer("n1", true, true), failed]);
        assert_eq!(out, PeriodOutcome::Failed);
        assert!(!out.is_found());
    }

    #[test]
    fn error_field_is_omitted_when_absent() {
        let json = serde_json::to_value(answer("n1", true, true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "node": "n1", "instance_found": true, "task_found": true })
        );
        let back: NodePeriodResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.error, None);
    }

    #[test]
    fn parses_operator_input() {
        let req = ChangePeriodRequest::parse(" es-main ", "ch, ns", "2s").unwrap();
        assert_eq!(req.instance, "es-main");
        assert_eq!(req.tasks, Some(vec!["ch".to_string(), "ns".to_string()]));
        assert_eq!(req.period(), Duration::from_secs(2));

        let req = ChangePeriodRequest::parse("es-main", " , ", "1500").unwrap();
        assert_eq!(req.tasks, None);
        assert_eq!(req.period_ms, 1_500);

        assert!(matches!(
            ChangePeriodRequest::parse("es-main", "ch", "0"),
            Err(ClusterError::InvalidRequest(_))
        ));
        assert!(ChangePeriodRequest::parse("es-main", "ch", "soon").is_err());
    }

    #[test]
    fn validate_rejects_zero_period() {
        let req = ChangePeriodRequest::new("es-main", None, Duration::ZERO);
        assert!(ChangePeriod.validate(&req).is_err());
    }
}
