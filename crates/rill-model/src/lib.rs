//! Public data model of the rill polling-job manager.
//!
//! This crate holds the types shared by the scheduler and the cluster control layer:
//! information kinds, task definitions, connection settings and the parsing of
//! settings documents into them.

mod error;
pub use error::SettingsError;

mod kind;
pub use kind::InfoType;

mod domain;
pub use domain::*;

pub mod settings;
pub use settings::{ConnectionSettings, InstanceSettings};

mod request;
pub use request::{parse_period, split_task_names};
