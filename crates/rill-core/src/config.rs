use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs of instance lifecycle and task control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Time closed tasks get to exit on their own before they are cancelled.
    pub grace_ms: u64,
    /// Extra settle time between stop and start during a restart.
    pub restart_delay_ms: u64,
    /// Upper bound on waiting for a task context to terminate when it is restarted.
    pub task_restart_timeout_ms: u64,
    /// Periods above this are restarted immediately when shortened.
    pub long_period_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            grace_ms: 200,
            restart_delay_ms: 1_000,
            task_restart_timeout_ms: 5_000,
            long_period_ms: 3_000,
        }
    }
}

impl ManagerConfig {
    #[inline]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    #[inline]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    #[inline]
    pub fn task_restart_timeout(&self) -> Duration {
        Duration::from_millis(self.task_restart_timeout_ms)
    }

    #[inline]
    pub fn long_period(&self) -> Duration {
        Duration::from_millis(self.long_period_ms)
    }
}
