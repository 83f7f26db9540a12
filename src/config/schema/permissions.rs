use serde::{Deserialize, Serialize};

fn default_granted() -> Vec<String> {
    vec!["file_read".into(), "file_write".into()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Permission tags the engine may use when matching tools.
    #[serde(default = "default_granted")]
    pub granted: Vec<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            granted: default_granted(),
        }
    }
}
