use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use rill_model::NodeId;
use serde_json::Value;
use tracing::trace;

use super::{NodeMessage, Transport};
use crate::{error::TransportError, node::NodeService};

#[derive(Default)]
struct Members {
    services: BTreeMap<NodeId, Arc<NodeService>>,
    unreachable: BTreeSet<NodeId>,
}

/// In-process cluster: every member is a [`NodeService`] in this process.
///
/// Serves single-process deployments and tests. Members can be marked
/// unreachable to simulate partitions.
#[derive(Clone, Default)]
pub struct LocalCluster {
    members: Arc<RwLock<Members>>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member, replacing any service with the same node id.
    pub fn join(&self, service: NodeService) -> Arc<NodeService> {
        let service = Arc::new(service);
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members
            .services
            .insert(service.node().clone(), Arc::clone(&service));
        service
    }

    pub fn leave(&self, node: &NodeId) -> Option<Arc<NodeService>> {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members.unreachable.remove(node);
        members.services.remove(node)
    }

    /// Mark a member (un)reachable. It stays enumerated either way.
    pub fn set_reachable(&self, node: &NodeId, reachable: bool) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if reachable {
            members.unreachable.remove(node);
        } else {
            members.unreachable.insert(node.clone());
        }
    }

    fn service(&self, node: &NodeId) -> Option<Arc<NodeService>> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        if members.unreachable.contains(node) {
            return None;
        }
        members.services.get(node).cloned()
    }
}

#[async_trait]
impl Transport for LocalCluster {
    fn nodes(&self) -> Vec<NodeId> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.services.keys().cloned().collect()
    }

    async fn deliver(&self, node: &NodeId, msg: NodeMessage) -> Result<Value, TransportError> {
        let service = self
            .service(node)
            .ok_or_else(|| TransportError::Unreachable(node.clone()))?;
        trace!(node = %node, action = %msg.action, "delivering in-process");

        service
            .handle(msg)
            .await
            .map_err(|e| TransportError::Remote {
                node: node.clone(),
                reason: e.to_string(),
            })
    }
}
