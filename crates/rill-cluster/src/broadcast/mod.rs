//! Fan-out of one control request to every node, fan-in of the per-node answers.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rill_core::InstanceRegistry;
use rill_model::NodeId;
use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::{
    error::ClusterError,
    transport::{NodeMessage, Transport},
};

/// A cluster-wide control operation.
///
/// Each node runs [`Operation::on_node`] against its own registry; the
/// caller merges the answers with [`Operation::reduce`].
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Action name on the wire.
    const NAME: &'static str;

    type Request: Serialize + DeserializeOwned + Send + Sync + 'static;
    type NodeResponse: Serialize + DeserializeOwned + Send + 'static;
    type Output;

    /// Instance addressed by the request; `None` for untargeted operations.
    fn target<'r>(&self, _req: &'r Self::Request) -> Option<&'r str> {
        None
    }

    /// Operation-specific request checks, run before anything is sent.
    fn validate(&self, _req: &Self::Request) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn on_node(
        &self,
        req: &Self::Request,
        registry: &InstanceRegistry,
        node: &NodeId,
    ) -> Result<Self::NodeResponse, ClusterError>;

    /// Merge the answers of the nodes that responded. Must not depend on their order.
    fn reduce(&self, responses: &[Self::NodeResponse]) -> Self::Output;
}

/// A node that produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: NodeId,
    pub error: String,
}

/// Every per-node answer plus the reduced outcome.
#[derive(Debug, Clone)]
pub struct Aggregated<R, T> {
    /// Answers ordered by node id.
    pub responses: Vec<R>,
    /// Nodes that failed, ordered by node id.
    pub failures: Vec<NodeFailure>,
    pub outcome: T,
}

impl<R, T> Aggregated<R, T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the failures.
    pub fn failure_detail(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.node, f.error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub type AggregateOf<O> = Aggregated<<O as Operation>::NodeResponse, <O as Operation>::Output>;

/// Runs one [`Operation`] across the cluster.
pub struct BroadcastController<O: Operation> {
    op: Arc<O>,
    transport: Arc<dyn Transport>,
}

impl<O: Operation> BroadcastController<O> {
    pub fn new(op: O, transport: Arc<dyn Transport>) -> Self {
        Self {
            op: Arc::new(op),
            transport,
        }
    }

    pub fn operation(&self) -> &O {
        &self.op
    }

    /// Send `req` to every node, wait for all of them and reduce.
    ///
    /// Delivery failures are recorded in the aggregate, never retried.
    /// A targeted request with a blank target is rejected before anything is sent.
    #[instrument(level = "debug", skip_all, fields(op = O::NAME))]
    pub async fn execute(&self, req: O::Request) -> Result<AggregateOf<O>, ClusterError> {
        if let Some(target) = self.op.target(&req)
            && target.trim().is_empty()
        {
            return Err(ClusterError::InvalidRequest(format!(
                "'{}' requires an instance name",
                O::NAME
            )));
        }
        self.op.validate(&req)?;

        let payload = serde_json::to_value(&req)?;
        let nodes = self.transport.nodes();
        debug!(nodes = nodes.len(), "broadcasting");

        let mut pending = JoinSet::new();
        let mut spawned = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let transport = Arc::clone(&self.transport);
            let msg = NodeMessage::new(O::NAME, payload.clone());
            let target = node.clone();
            let handle = pending.spawn(async move { transport.deliver(&target, msg).await });
            spawned.insert(handle.id(), node);
        }

        let mut responses = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = pending.join_next_with_id().await {
            let (id, delivered) = match joined {
                Ok((id, delivered)) => (id, delivered),
                Err(e) => {
                    let id = e.id();
                    let error = format!("delivery task failed: {e}");
                    if let Some(node) = spawned.remove(&id) {
                        failures.push(NodeFailure { node, error });
                    }
                    continue;
                }
            };
            let Some(node) = spawned.remove(&id) else {
                continue;
            };
            match delivered
                .map_err(|e| e.to_string())
                .and_then(|v| serde_json::from_value::<O::NodeResponse>(v).map_err(|e| e.to_string()))
            {
                Ok(resp) => responses.push((node, resp)),
                Err(error) => {
                    warn!(node = %node, error = %error, "node did not answer");
                    failures.push(NodeFailure { node, error });
                }
            }
        }

        responses.sort_by(|a, b| a.0.cmp(&b.0));
        failures.sort_by(|a, b| a.node.cmp(&b.node));
        let responses: Vec<O::NodeResponse> = responses.into_iter().map(|(_, r)| r).collect();
        let outcome = self.op.reduce(&responses);
        debug!(answered = responses.len(), failed = failures.len(), "broadcast complete");

        Ok(Aggregated {
            responses,
            failures,
            outcome,
        })
    }
}
