use rill_core::CoreError;
use rill_model::NodeId;
use thiserror::Error;

/// Failure to get an answer from one node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("node '{0}' is unreachable")]
    Unreachable(NodeId),

    #[error("node '{node}' failed to handle the request: {reason}")]
    Remote { node: NodeId, reason: String },
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Nothing matched on the nodes that answered, but some nodes did not answer.
    #[error("{failed} node(s) did not answer: {detail}")]
    Incomplete { failed: usize, detail: String },

    /// A node hosting the instance accepted the request but could not apply it.
    #[error("rejected by hosting node(s): {0}")]
    Rejected(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<rill_model::SettingsError> for ClusterError {
    fn from(e: rill_model::SettingsError) -> Self {
        ClusterError::InvalidRequest(e.to_string())
    }
}
