pub mod schema;

pub use schema::{
    Config, EngineConfig, ObservabilityBackend, ObservabilityConfig, PermissionsConfig,
    ToolsConfig,
};
