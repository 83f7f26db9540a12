use crate::core::planner::{StepResult, Verification};
use crate::core::tools::{ExecutionContextKind, ToolMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_STEPS: usize = 10;

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

/// Everything a planning capability may look at when producing a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningContext {
    pub task_description: String,
    #[serde(default)]
    pub available_tools: Vec<ToolMetadata>,
    #[serde(default)]
    pub granted_permissions: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub constraints: Map<String, Value>,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub previous_failures: Vec<String>,
}

impl PlanningContext {
    pub fn new(task_description: impl Into<String>) -> Self {
        Self {
            task_description: task_description.into(),
            available_tools: Vec::new(),
            granted_permissions: Vec::new(),
            environment: BTreeMap::new(),
            deadline: None,
            constraints: Map::new(),
            max_steps: DEFAULT_MAX_STEPS,
            previous_failures: Vec::new(),
        }
    }

    pub fn with_available_tools(mut self, tools: Vec<ToolMetadata>) -> Self {
        self.available_tools = tools;
        self
    }

    pub fn with_granted_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: Value) -> Self {
        self.constraints.insert(key.into(), value);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn has_task(&self) -> bool {
        !self.task_description.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEstimate {
    pub step_count: usize,
    pub total_estimated_seconds: u64,
    pub remote_steps: usize,
}

/// Aggregated needs of a plan, derived from its steps and the resolved tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCapabilities {
    pub required_tools: Vec<String>,
    pub required_permissions: Vec<String>,
    pub suggested_execution_context: ExecutionContextKind,
    pub estimated_resources: ResourceEstimate,
}

/// Planner's rough read on a task before it commits to steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnalysis {
    pub estimated_complexity: u8,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub remote_execution_advisable: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl TaskAnalysis {
    pub const MIN_COMPLEXITY: u8 = 1;
    pub const MAX_COMPLEXITY: u8 = 10;

    pub fn new(estimated_complexity: u8, reasoning: impl Into<String>) -> anyhow::Result<Self> {
        if !(Self::MIN_COMPLEXITY..=Self::MAX_COMPLEXITY).contains(&estimated_complexity) {
            anyhow::bail!(
                "estimated complexity must be within {}..={}, got {estimated_complexity}",
                Self::MIN_COMPLEXITY,
                Self::MAX_COMPLEXITY
            );
        }
        Ok(Self {
            estimated_complexity,
            required_capabilities: Vec::new(),
            remote_execution_advisable: false,
            reasoning: reasoning.into(),
        })
    }

    pub fn with_required_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_remote_execution(mut self, advisable: bool) -> Self {
        self.remote_execution_advisable = advisable;
        self
    }
}

/// Why the previous round failed; handed to `Planner::replan`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureContext {
    pub failed_step_ids: Vec<String>,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub results: Vec<StepResult>,
    #[serde(default)]
    pub verifications: Vec<Verification>,
    pub attempt: u32,
}

impl FailureContext {
    pub fn new(attempt: u32) -> Self {
        Self {
            attempt,
            ..Self::default()
        }
    }

    pub fn record(&mut self, step_id: impl Into<String>, reason: impl Into<String>) {
        let step_id = step_id.into();
        if !self.failed_step_ids.contains(&step_id) {
            self.failed_step_ids.push(step_id);
        }
        self.reasons.push(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.failed_step_ids.is_empty() && self.reasons.is_empty()
    }

    pub fn summary(&self) -> String {
        self.reasons.join("; ")
    }
}
