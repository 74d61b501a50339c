use std::fmt;

use async_trait::async_trait;
use rill_core::InstanceRegistry;
use rill_model::{InstanceName, NodeId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{broadcast::Operation, error::ClusterError};

/// Stop or restart one named instance wherever it is hosted.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleCommand {
    Stop,
    Restart,
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleCommand::Stop => "stop",
            LifecycleCommand::Restart => "restart",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRequest {
    pub instance: InstanceName,
    pub command: LifecycleCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLifecycleResponse {
    pub node: NodeId,
    pub instance_found: bool,
}

#[async_trait]
impl Operation for Lifecycle {
    const NAME: &'static str = "instance_lifecycle";

    type Request = LifecycleRequest;
    type NodeResponse = NodeLifecycleResponse;
    type Output = bool;

    fn target<'r>(&self, req: &'r LifecycleRequest) -> Option<&'r str> {
        Some(&req.instance)
    }

    async fn on_node(
        &self,
        req: &LifecycleRequest,
        registry: &InstanceRegistry,
        node: &NodeId,
    ) -> Result<NodeLifecycleResponse, ClusterError> {
        let Some(instance) = registry.lookup(req.instance.trim()) else {
            return Ok(NodeLifecycleResponse {
                node: node.clone(),
                instance_found: false,
            });
        };
        info!(node = %node, instance = %req.instance, command = %req.command, "lifecycle command");
        match req.command {
            LifecycleCommand::Stop => instance.stop().await,
            LifecycleCommand::Restart => instance.restart().await?,
        }
        Ok(NodeLifecycleResponse {
            node: node.clone(),
            instance_found: true,
        })
    }

    /// Success if any node hosts the instance.
    fn reduce(&self, responses: &[NodeLifecycleResponse]) -> bool {
        responses.iter().any(|r| r.instance_found)
    }
}
