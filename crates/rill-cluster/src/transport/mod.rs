mod local;
pub use local::LocalCluster;

use async_trait::async_trait;
use rill_model::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// One control request addressed to a node: the operation name plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMessage {
    pub action: String,
    pub payload: Value,
}

impl NodeMessage {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }
}

/// Point-to-point delivery to the members of the cluster.
///
/// Supplied by the host runtime. Delivery is assumed reliable; a node that
/// cannot be reached reports [`TransportError::Unreachable`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Every current member, the local node included.
    fn nodes(&self) -> Vec<NodeId>;

    /// Deliver `msg` to `node` and return its response payload.
    async fn deliver(&self, node: &NodeId, msg: NodeMessage) -> Result<Value, TransportError>;
}
