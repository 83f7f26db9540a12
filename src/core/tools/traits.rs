use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where a tool does its work. Declaration order is the ranking preference.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ExecutionContextKind {
    #[default]
    Local,
    Hybrid,
    Remote,
}

impl ExecutionContextKind {
    /// Counts against the remote in-flight limit.
    pub fn is_remote_like(self) -> bool {
        matches!(self, Self::Hybrid | Self::Remote)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl ParameterKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kind: ParameterKind,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            kind,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Static description of a tool, used for matching and shown to planners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub required_permissions: Vec<String>,
    #[serde(default)]
    pub execution_context: ExecutionContextKind,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: Vec::new(),
            required_permissions: Vec::new(),
            execution_context: ExecutionContextKind::Local,
            parameters: Vec::new(),
            is_async: true,
            timeout_ms: None,
            domain: None,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, execution_context: ExecutionContextKind) -> Self {
        self.execution_context = execution_context;
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// True when `tag` names this tool or one of its capabilities.
    pub fn provides(&self, tag: &str) -> bool {
        self.name == tag || self.capabilities.iter().any(|capability| capability == tag)
    }
}

/// Raw outcome reported by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// True when any word of `action` (split on `_`, `-`, `.`, `/` and spaces) is
/// one of `keywords`. Used by tools to implement `can_handle`.
pub fn action_mentions(action: &str, keywords: &[&str]) -> bool {
    action
        .to_lowercase()
        .split(|c: char| matches!(c, '_' | '-' | '.' | '/') || c.is_whitespace())
        .any(|word| keywords.contains(&word))
}

/// Per-invocation information handed to a tool.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub plan_id: String,
    pub step_id: String,
    pub action: String,
    pub cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(plan_id: impl Into<String>, step_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            step_id: step_id.into(),
            action: action.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;

/// Core tool trait. Implement for any capability the engine can dispatch to.
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn required_permissions(&self) -> &[String] {
        &self.metadata().required_permissions
    }

    /// Action pre-filter applied before capability matching.
    fn can_handle(&self, _action: &str) -> bool {
        true
    }

    /// Checks required parameters and declared kinds. Runs before `execute`.
    fn validate_parameters(&self, parameters: &Map<String, Value>) -> Result<(), ValidationError> {
        let metadata = self.metadata();
        for spec in &metadata.parameters {
            match parameters.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ValidationError::MissingParameter {
                        tool: metadata.name.clone(),
                        parameter: spec.name.clone(),
                    });
                }
                Some(value) if !value.is_null() && !spec.kind.accepts(value) => {
                    return Err(ValidationError::InvalidParameter {
                        tool: metadata.name.clone(),
                        parameter: spec.name.clone(),
                        expected: spec.kind.to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn execute<'a>(
        &'a self,
        parameters: Map<String, Value>,
        ctx: &'a InvocationContext,
    ) -> ToolFuture<'a>;
}
