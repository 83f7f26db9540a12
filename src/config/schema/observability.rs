use serde::{Deserialize, Serialize};

/// Where lifecycle events go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObservabilityBackend {
    None,
    #[default]
    Log,
    Jsonl,
}

fn default_audit_path() -> String {
    "audit/events.jsonl".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// "none" | "log" | "jsonl"
    #[serde(default)]
    pub backend: ObservabilityBackend,
    /// JSON lines audit file, relative to the workspace unless absolute.
    #[serde(default = "default_audit_path")]
    pub audit_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: ObservabilityBackend::default(),
            audit_path: default_audit_path(),
        }
    }
}
