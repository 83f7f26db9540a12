use super::traits::{
    ExecutionContextKind, InvocationContext, ParameterKind, ParameterSpec, Tool, ToolFuture,
    ToolMetadata, ToolResult, action_mentions,
};
use crate::security::WorkspaceSandbox;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;

const FILE_OPERATION_TIMEOUT_MS: u64 = 30_000;
/// Files larger than this are refused by `read`.
const MAX_READ_BYTES: u64 = 10 * 1024 * 1024;
const FILE_ACTIONS: &[&str] = &[
    "file", "read", "write", "save", "load", "list", "delete", "remove", "exists",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
enum FileOperation {
    #[strum(to_string = "read", serialize = "load")]
    Read,
    #[strum(to_string = "write", serialize = "save")]
    Write,
    List,
    #[strum(to_string = "delete", serialize = "remove")]
    Delete,
    Exists,
}

/// First word of `requested` naming an operation, so `file_write` and
/// `save_report` both resolve.
fn parse_operation(requested: &str) -> Option<FileOperation> {
    requested
        .to_lowercase()
        .split(|c: char| matches!(c, '_' | '-' | '.' | '/') || c.is_whitespace())
        .find_map(|word| word.parse().ok())
}

/// Workspace-confined file access: read, write, list, delete, exists.
pub struct FileOperationTool {
    metadata: ToolMetadata,
    sandbox: Arc<WorkspaceSandbox>,
}

impl FileOperationTool {
    pub fn new(sandbox: Arc<WorkspaceSandbox>) -> Self {
        let metadata = ToolMetadata::new(
            "file_operation",
            "Read, write, list, delete or check files inside the workspace",
        )
        .with_capabilities(["file_read", "file_write", "file_list", "file_delete"])
        .with_permissions(["file_read", "file_write"])
        .with_context(ExecutionContextKind::Local)
        .with_parameter(ParameterSpec::optional(
            "operation",
            ParameterKind::String,
            "read | write | list | delete | exists, optionally file_-prefixed (defaults to the step action)",
        ))
        .with_parameter(ParameterSpec::required(
            "path",
            ParameterKind::String,
            "Path relative to the workspace",
        ))
        .with_parameter(ParameterSpec::optional(
            "content",
            ParameterKind::String,
            "Content for write",
        ))
        .with_timeout_ms(FILE_OPERATION_TIMEOUT_MS)
        .with_domain("filesystem");

        Self { metadata, sandbox }
    }

    async fn resolve_existing(&self, path: &str) -> Result<PathBuf, ToolResult> {
        let full_path = self.sandbox.workspace_dir.join(path);
        let resolved = tokio::fs::canonicalize(&full_path)
            .await
            .map_err(|e| ToolResult::fail(format!("Failed to resolve {path}: {e}")))?;
        if !self.sandbox.is_resolved_path_allowed(&resolved) {
            return Err(ToolResult::fail(
                "blocked by sandbox: resolved path escapes workspace",
            ));
        }
        Ok(resolved)
    }

    async fn read(&self, path: &str) -> anyhow::Result<ToolResult> {
        let resolved = match self.resolve_existing(path).await {
            Ok(resolved) => resolved,
            Err(failure) => return Ok(failure),
        };

        let meta = tokio::fs::metadata(&resolved).await?;
        if meta.len() > MAX_READ_BYTES {
            return Ok(ToolResult::fail(format!(
                "File too large: {} bytes (limit: {MAX_READ_BYTES} bytes)",
                meta.len()
            )));
        }

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolResult::ok(json!({
                "path": path,
                "bytes": content.len(),
                "content": content,
            }))),
            Err(e) => Ok(ToolResult::fail(format!("Failed to read file: {e}"))),
        }
    }

    async fn write(&self, path: &str, content: &str) -> anyhow::Result<ToolResult> {
        let full_path = self.sandbox.workspace_dir.join(path);
        let Some(parent) = full_path.parent() else {
            return Ok(ToolResult::fail("Invalid path: missing parent directory"));
        };
        tokio::fs::create_dir_all(parent).await?;

        let resolved_parent = match tokio::fs::canonicalize(parent).await {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::fail(format!("Failed to resolve file path: {e}"))),
        };
        if !self.sandbox.is_resolved_path_allowed(&resolved_parent) {
            return Ok(ToolResult::fail(
                "blocked by sandbox: resolved path escapes workspace",
            ));
        }

        let Some(file_name) = full_path.file_name() else {
            return Ok(ToolResult::fail("Invalid path: missing file name"));
        };
        let target = resolved_parent.join(file_name);

        if let Ok(meta) = tokio::fs::symlink_metadata(&target).await
            && meta.file_type().is_symlink()
        {
            return Ok(ToolResult::fail(format!(
                "Refusing to write through symlink: {}",
                target.display()
            )));
        }

        match tokio::fs::write(&target, content).await {
            Ok(()) => Ok(ToolResult::ok(json!({
                "path": path,
                "bytes": content.len(),
            }))),
            Err(e) => Ok(ToolResult::fail(format!("Failed to write file: {e}"))),
        }
    }

    async fn list(&self, path: &str) -> anyhow::Result<ToolResult> {
        let resolved = match self.resolve_existing(path).await {
            Ok(resolved) => resolved,
            Err(failure) => return Ok(failure),
        };

        let mut reader = match tokio::fs::read_dir(&resolved).await {
            Ok(reader) => reader,
            Err(e) => return Ok(ToolResult::fail(format!("Failed to list directory: {e}"))),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let is_dir = entry.file_type().await.is_ok_and(|kind| kind.is_dir());
            entries.push((entry.file_name().to_string_lossy().to_string(), is_dir));
        }
        entries.sort();

        let entries = entries
            .into_iter()
            .map(|(name, is_dir)| json!({"name": name, "isDir": is_dir}))
            .collect::<Vec<_>>();
        Ok(ToolResult::ok(json!({"path": path, "entries": entries})))
    }

    async fn delete(&self, path: &str) -> anyhow::Result<ToolResult> {
        let resolved = match self.resolve_existing(path).await {
            Ok(resolved) => resolved,
            Err(failure) => return Ok(failure),
        };

        let outcome = if tokio::fs::metadata(&resolved).await?.is_dir() {
            tokio::fs::remove_dir(&resolved).await
        } else {
            tokio::fs::remove_file(&resolved).await
        };

        match outcome {
            Ok(()) => Ok(ToolResult::ok(json!({"path": path, "deleted": true}))),
            Err(e) => Ok(ToolResult::fail(format!("Failed to delete {path}: {e}"))),
        }
    }

    async fn exists(&self, path: &str) -> ToolResult {
        let full_path = self.sandbox.workspace_dir.join(path);
        let exists = match tokio::fs::canonicalize(&full_path).await {
            Ok(resolved) => self.sandbox.is_resolved_path_allowed(&resolved),
            Err(_) => false,
        };
        ToolResult::ok(json!({"path": path, "exists": exists}))
    }
}

impl Tool for FileOperationTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn can_handle(&self, action: &str) -> bool {
        action_mentions(action, FILE_ACTIONS)
    }

    fn execute<'a>(
        &'a self,
        parameters: Map<String, Value>,
        ctx: &'a InvocationContext,
    ) -> ToolFuture<'a> {
        Box::pin(async move {
            let requested = parameters
                .get("operation")
                .and_then(Value::as_str)
                .unwrap_or(&ctx.action);
            let Some(operation) = parse_operation(requested) else {
                return Ok(ToolResult::fail(format!(
                    "Unsupported file operation: {requested}"
                )));
            };

            let path = parameters
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("Missing 'path' parameter"))?;

            if !self.sandbox.is_path_allowed(path) {
                return Ok(ToolResult::fail("blocked by sandbox: path not allowed"));
            }

            tracing::debug!(step_id = %ctx.step_id, %operation, path, "file operation");

            match operation {
                FileOperation::Read => self.read(path).await,
                FileOperation::Write => {
                    let content = parameters
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    self.write(path, content).await
                }
                FileOperation::List => self.list(path).await,
                FileOperation::Delete => self.delete(path).await,
                FileOperation::Exists => Ok(self.exists(path).await),
            }
        })
    }
}
