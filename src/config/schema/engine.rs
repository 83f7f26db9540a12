use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_replans() -> u32 {
    3
}

fn default_step_timeout_secs() -> u64 {
    30
}

fn default_max_parallel_steps() -> usize {
    3
}

fn default_max_remote_in_flight() -> usize {
    2
}

/// Limits applied by the orchestrator and step executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Replanning rounds allowed before a plan fails.
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,
    /// Ceiling for tools that declare no timeout of their own.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,
    #[serde(default = "default_max_parallel_steps")]
    pub max_parallel_steps: usize,
    /// Separate cap for steps bound to remote or hybrid tools.
    #[serde(default = "default_max_remote_in_flight")]
    pub max_remote_in_flight: usize,
}

impl EngineConfig {
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.default_step_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
            default_step_timeout_secs: default_step_timeout_secs(),
            max_parallel_steps: default_max_parallel_steps(),
            max_remote_in_flight: default_max_remote_in_flight(),
        }
    }
}
