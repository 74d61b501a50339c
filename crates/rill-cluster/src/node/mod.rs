use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use rill_core::InstanceRegistry;
use rill_model::NodeId;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    broadcast::Operation,
    error::ClusterError,
    ops::{ChangePeriod, Lifecycle, ListInstances},
    transport::NodeMessage,
};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ClusterError>> + Send>>;
type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Receiving end of control requests on one node.
///
/// Maps operation names to handlers running against this node's registry.
pub struct NodeService {
    node: NodeId,
    registry: InstanceRegistry,
    handlers: HashMap<&'static str, Handler>,
}

impl NodeService {
    /// Service without any operation registered.
    pub fn new(node: NodeId, registry: InstanceRegistry) -> Self {
        Self {
            node,
            registry,
            handlers: HashMap::new(),
        }
    }

    /// Service answering the built-in operations.
    pub fn with_default_operations(node: NodeId, registry: InstanceRegistry) -> Self {
        Self::new(node, registry)
            .with(ListInstances)
            .with(ChangePeriod)
            .with(Lifecycle)
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn with<O: Operation>(mut self, op: O) -> Self {
        self.register(op);
        self
    }

    /// Register `op` under its name, replacing a previous handler.
    pub fn register<O: Operation>(&mut self, op: O) {
        let op = Arc::new(op);
        let registry = self.registry.clone();
        let node = self.node.clone();

        let handler: Handler = Arc::new(move |payload: Value| {
            let op = Arc::clone(&op);
            let registry = registry.clone();
            let node = node.clone();
            Box::pin(async move {
                let req: O::Request = serde_json::from_value(payload)?;
                let resp = op.on_node(&req, &registry, &node).await?;
                let out = serde_json::to_value(resp)?;
                Ok::<_, ClusterError>(out)
            }) as HandlerFuture
        });
        self.handlers.insert(O::NAME, handler);
    }

    /// Decode, run and encode one request.
    #[instrument(level = "debug", skip_all, fields(node = %self.node, action = %msg.action))]
    pub async fn handle(&self, msg: NodeMessage) -> Result<Value, ClusterError> {
        let handler = self
            .handlers
            .get(msg.action.as_str())
            .ok_or_else(|| ClusterError::UnknownOperation(msg.action.clone()))?;
        let out = handler(msg.payload).await;
        debug!(ok = out.is_ok(), "request handled");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatches_by_action_name() {
        let svc = NodeService::with_default_operations(NodeId::from("n1"), InstanceRegistry::new());
        let out = svc
            .handle(NodeMessage::new(ListInstances::NAME, json!({})))
            .await
            .unwrap();
        assert_eq!(out, json!({ "node": "n1", "instances": [] }));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let svc = NodeService::new(NodeId::from("n1"), InstanceRegistry::new());
        let err = svc
            .handle(NodeMessage::new("list_instances", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::UnknownOperation(ref a) if a == "list_instances"));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_codec_error() {
        let svc = NodeService::with_default_operations(NodeId::from("n1"), InstanceRegistry::new());
        let err = svc
            .handle(NodeMessage::new(ChangePeriod::NAME, json!({ "instance": 7 })))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Codec(_)));
    }
}
