//! Typed view of an instance settings document.
//!
//! ```json
//! {
//!   "connection": { "type": "rest", "url_base": "http://localhost:9200" },
//!   "tasks": {
//!     "health": {
//!       "info_type": "cluster_health",
//!       "target_index": "stats",
//!       "target_type": "health",
//!       "period": "1m",
//!       "params": { "level": "shards" }
//!     }
//!   }
//! }
//! ```

mod connection;
pub use connection::{ConnectionSettings, DEFAULT_REST_TIMEOUT, RemoteAddress};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{TaskDef, error::SettingsError};

/// Connection plus task definitions of one instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSettings {
    pub connection: ConnectionSettings,
    /// Task definitions, unique by name.
    pub tasks: Vec<TaskDef>,
}

impl InstanceSettings {
    /// Parse a whole settings document.
    ///
    /// Fails when the connection section is missing or invalid, when the task map
    /// is absent or empty, when a task definition is invalid, or when two task
    /// names collide after trimming.
    pub fn from_value(doc: &Value) -> Result<Self, SettingsError> {
        let connection = doc
            .get("connection")
            .ok_or_else(|| SettingsError::Missing("connection".into()))?;
        let connection = ConnectionSettings::from_settings(connection)?;

        let raw_tasks = doc
            .get("tasks")
            .and_then(Value::as_object)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| SettingsError::MissingOrEmpty("tasks".into()))?;

        let mut seen = HashSet::with_capacity(raw_tasks.len());
        let mut tasks = Vec::with_capacity(raw_tasks.len());
        for (name, value) in raw_tasks {
            let def = TaskDef::from_settings(name, value)?;
            if !seen.insert(def.name.clone()) {
                return Err(SettingsError::Invalid(format!(
                    "duplicate 'tasks/{}' section",
                    def.name
                )));
            }
            tasks.push(def);
        }

        Ok(Self { connection, tasks })
    }
}
