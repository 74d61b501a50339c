use std::collections::BTreeSet;

use async_trait::async_trait;
use rill_core::InstanceRegistry;
use rill_model::{InstanceName, NodeId};
use serde::{Deserialize, Serialize};

use crate::{broadcast::Operation, error::ClusterError};

/// Names of every instance hosted anywhere in the cluster.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListInstances;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInstancesRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInstances {
    pub node: NodeId,
    pub instances: BTreeSet<InstanceName>,
}

#[async_trait]
impl Operation for ListInstances {
    const NAME: &'static str = "list_instances";

    type Request = ListInstancesRequest;
    type NodeResponse = NodeInstances;
    type Output = BTreeSet<InstanceName>;

    async fn on_node(
        &self,
        _req: &ListInstancesRequest,
        registry: &InstanceRegistry,
        node: &NodeId,
    ) -> Result<NodeInstances, ClusterError> {
        Ok(NodeInstances {
            node: node.clone(),
            instances: registry.names(),
        })
    }

    /// Union; a name hosted on several nodes is listed once.
    fn reduce(&self, responses: &[NodeInstances]) -> BTreeSet<InstanceName> {
        responses
            .iter()
            .flat_map(|r| r.instances.iter().cloned())
            .collect()
    }
}
