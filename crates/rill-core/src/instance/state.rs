use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`ManagedInstance`](super::ManagedInstance).
///
/// ```text
/// Unconfigured --configure--> Configured --start--> Running --stop--> Stopped
///                                  ^                                    |
///                                  +------------configure---------------+
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    #[default]
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Unconfigured => "unconfigured",
            InstanceState::Configured => "configured",
            InstanceState::Running => "running",
            InstanceState::Stopped => "stopped",
        }
    }

    /// `configure` and `reconfigure` are only legal in these states.
    pub fn accepts_settings(&self) -> bool {
        !matches!(self, InstanceState::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
