//! Cluster-wide control of managed instances.
//!
//! A control request is broadcast to every node through a [`Transport`]; each
//! node's [`NodeService`] runs the operation against its local registry and the
//! [`BroadcastController`] reduces the answers into one result.

mod api;
pub use api::ControlApi;
pub mod broadcast;
pub use broadcast::{AggregateOf, Aggregated, BroadcastController, NodeFailure, Operation};
mod error;
pub use error::{ClusterError, TransportError};
pub mod node;
pub use node::NodeService;
pub mod ops;
pub mod transport;
pub use transport::{LocalCluster, NodeMessage, Transport};
