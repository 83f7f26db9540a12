use super::{FileOperationTool, HttpRequestTool, ShellTool, Tool, ToolRegistry};
use crate::config::Config;
use crate::security::WorkspaceSandbox;
use std::sync::Arc;

/// Built-in tools configured from `config`.
pub fn default_tools(config: &Config) -> Vec<Arc<dyn Tool>> {
    let sandbox = Arc::new(WorkspaceSandbox::new(
        config.workspace_dir.clone(),
        config.tools.allowed_commands.clone(),
    ));

    vec![
        Arc::new(FileOperationTool::new(Arc::clone(&sandbox))),
        Arc::new(ShellTool::new(sandbox)),
        Arc::new(HttpRequestTool::new(config.tools.http_timeout_secs)),
    ]
}

/// Registry holding every built-in tool.
pub fn build_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in default_tools(config) {
        registry.register(tool);
    }
    tracing::debug!(tools = ?registry.list_names(), "tool registry built");
    registry
}
