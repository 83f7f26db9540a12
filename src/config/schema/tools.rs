use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_workspace_dir() -> String {
    "~/.stepforge/workspace".into()
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "echo", "git"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_http_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    /// Binaries the shell tool may start.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl ToolsConfig {
    /// Workspace directory with a leading `~` expanded.
    pub fn resolved_workspace_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.workspace_dir).as_ref())
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            allowed_commands: default_allowed_commands(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}
