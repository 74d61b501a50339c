mod lifecycle;
pub use lifecycle::{Lifecycle, LifecycleCommand, LifecycleRequest, NodeLifecycleResponse};

mod list;
pub use list::{ListInstances, ListInstancesRequest, NodeInstances};

mod period;
pub use period::{ChangePeriod, ChangePeriodRequest, NodePeriodResponse, PeriodOutcome};
