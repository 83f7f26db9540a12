use super::super::{EngineConfig, ObservabilityConfig, PermissionsConfig, ToolsConfig};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Resolved workspace directory - computed from `tools.workspace_dir`, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub permissions: PermissionsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        let tools = ToolsConfig::default();
        Self {
            config_path: PathBuf::new(),
            workspace_dir: tools.resolved_workspace_dir(),
            log_level: default_log_level(),
            engine: EngineConfig::default(),
            permissions: PermissionsConfig::default(),
            observability: ObservabilityConfig::default(),
            tools,
        }
    }
}

impl Config {
    /// Config rooted at an explicit workspace. Used by tests and embedders.
    pub fn for_workspace(workspace_dir: impl Into<PathBuf>) -> Self {
        let workspace_dir = workspace_dir.into();
        Self {
            tools: ToolsConfig {
                workspace_dir: workspace_dir.to_string_lossy().to_string(),
                ..ToolsConfig::default()
            },
            workspace_dir,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_parallel_steps == 0 {
            return Err(ConfigError::Validation(
                "engine.max_parallel_steps must be at least 1".into(),
            ));
        }
        if self.engine.max_remote_in_flight == 0 {
            return Err(ConfigError::Validation(
                "engine.max_remote_in_flight must be at least 1".into(),
            ));
        }
        if self.engine.default_step_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.default_step_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.tools.http_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "tools.http_timeout_secs must be greater than 0".into(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            )));
        }
        Ok(())
    }

    /// Audit file for the JSON lines observer.
    pub fn audit_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.observability.audit_path);
        if path.is_absolute() {
            path
        } else {
            self.workspace_dir.join(path)
        }
    }
}
