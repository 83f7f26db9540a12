mod core;
mod engine;
mod observability;
mod permissions;
mod tools;

pub use self::core::Config;
pub use engine::EngineConfig;
pub use observability::{ObservabilityBackend, ObservabilityConfig};
pub use permissions::PermissionsConfig;
pub use tools::ToolsConfig;
