pub mod factory;
pub mod file_operation;
pub mod http_request;
pub mod registry;
pub mod shell;
pub mod traits;

pub use factory::{build_registry, default_tools};
pub use file_operation::FileOperationTool;
pub use http_request::HttpRequestTool;
pub use registry::{ToolMatch, ToolRegistry};
pub use shell::ShellTool;
pub use traits::{
    ExecutionContextKind, InvocationContext, ParameterKind, ParameterSpec, Tool, ToolFuture,
    ToolMetadata, ToolResult, action_mentions,
};
