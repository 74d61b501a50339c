mod duration;
pub use duration::{duration_setting, parse_duration};

mod node_id;
pub use node_id::NodeId;

mod target;
pub use target::TargetLocation;

mod task_def;
pub use task_def::{DEFAULT_PERIOD, TaskDef};

/// Cluster-wide unique name of a managed instance.
pub type InstanceName = String;

/// Name of a polling task, unique within its instance.
pub type TaskName = String;

/// Params forwarded verbatim to the source collaborator.
pub type TaskParams = std::collections::BTreeMap<String, String>;
