use std::fmt;

use serde::{Deserialize, Serialize};

/// Index/type key a task's payloads are stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetLocation {
    pub index: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl TargetLocation {
    pub fn new(index: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            type_name: type_name.into(),
        }
    }
}

impl fmt::Display for TargetLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.type_name)
    }
}
