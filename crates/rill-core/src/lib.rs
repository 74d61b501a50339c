//! Scheduling core: polling tasks, managed instances and the node-local registry.

pub mod collab;
pub use collab::{SettingsLoader, Sink, Source, StaticSettings};
pub mod config;
pub use config::ManagerConfig;
pub mod error;
pub use error::{CoreError, SinkError, SourceError};
pub mod instance;
pub use instance::{InstanceState, ManagedInstance, ManagedInstanceBuilder};
pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics, PollOutcome, noop_metrics};
pub mod registry;
pub use registry::InstanceRegistry;
pub mod router;
pub use router::{SourceBuilder, SourceRouter};
pub mod system;
pub mod task;
pub use task::{PollingTask, TaskContext};

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
