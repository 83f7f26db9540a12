use crate::core::planner::DependencyGraph;
use crate::error::{InvalidTransition, PlanValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status shared by plans and steps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Planning,
    Executing,
    Verifying,
    Completed,
    Failed,
    Replanning,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use ExecutionStatus::{
            Cancelled, Completed, Executing, Failed, Pending, Planning, Replanning, Verifying,
        };

        match self {
            Pending => matches!(next, Planning | Executing | Failed | Cancelled),
            Planning => matches!(next, Executing | Failed | Cancelled),
            Executing => matches!(next, Verifying | Failed | Cancelled),
            Verifying => matches!(next, Completed | Failed | Replanning | Cancelled),
            Replanning => matches!(next, Executing | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }

    fn checked(self, next: Self, subject: &str) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                subject: subject.to_string(),
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// One unit of work inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub estimated_duration_seconds: u64,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl PlanStep {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            action: action.into(),
            parameters: Map::new(),
            required_tools: Vec::new(),
            estimated_duration_seconds: 0,
            status: ExecutionStatus::Pending,
            dependencies: Vec::new(),
            sequence_number: None,
            tool_name: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_required_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_estimated_duration(mut self, seconds: u64) -> Self {
        self.estimated_duration_seconds = seconds;
        self
    }

    pub fn with_sequence_number(mut self, sequence_number: u32) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), InvalidTransition> {
        self.status = self.status.checked(next, &format!("step {}", self.id))?;
        Ok(())
    }

    /// Fresh pending copy of this step for the next planning round.
    pub fn reset_for_replan(&self) -> Self {
        Self {
            status: ExecutionStatus::Pending,
            ..self.clone()
        }
    }

    /// Same work as `other`, ignoring lifecycle fields.
    pub fn same_work_as(&self, other: &Self) -> bool {
        self.id == other.id
            && self.action == other.action
            && self.parameters == other.parameters
            && self.required_tools == other.required_tools
            && self.dependencies == other.dependencies
    }
}

/// Tagged step payload. Replaces an untyped result value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepPayload {
    Success {
        tool: String,
        data: Value,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        message: String,
    },
    #[default]
    Empty,
}

impl StepPayload {
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Error { .. } | Self::Empty => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub result: StepPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub duration_milliseconds: u64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StepResult {
    pub fn completed(step_id: impl Into<String>, tool: impl Into<String>, data: Value) -> Self {
        Self {
            step_id: step_id.into(),
            status: ExecutionStatus::Completed,
            result: StepPayload::Success {
                tool: tool.into(),
                data,
            },
            error: None,
            executed_at: Utc::now(),
            duration_milliseconds: 0,
            metadata: Map::new(),
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        tool: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            step_id: step_id.into(),
            status: ExecutionStatus::Failed,
            result: StepPayload::Error {
                tool,
                message: error.clone(),
            },
            error: Some(error),
            executed_at: Utc::now(),
            duration_milliseconds: 0,
            metadata: Map::new(),
        }
    }

    pub fn cancelled(step_id: impl Into<String>, tool: Option<String>) -> Self {
        Self {
            status: ExecutionStatus::Cancelled,
            ..Self::failed(step_id, tool, "cancelled")
        }
    }

    pub fn with_duration_ms(mut self, duration_milliseconds: u64) -> Self {
        self.duration_milliseconds = duration_milliseconds;
        self
    }

    pub fn with_executed_at(mut self, executed_at: DateTime<Utc>) -> Self {
        self.executed_at = executed_at;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn tool(&self) -> Option<&str> {
        match &self.result {
            StepPayload::Success { tool, .. } => Some(tool),
            StepPayload::Error { tool, .. } => tool.as_deref(),
            StepPayload::Empty => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum VerificationResult {
    Success,
    Partial,
    Failed,
    NeedsReplanning,
}

/// Judgement about a `StepResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub step_id: String,
    pub result: VerificationResult,
    pub reasoning: String,
    #[serde(default)]
    pub issues: Vec<String>,
    pub verified_at: DateTime<Utc>,
    #[serde(default)]
    pub evidence: Map<String, Value>,
}

impl Verification {
    pub fn new(
        step_id: impl Into<String>,
        result: VerificationResult,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            result,
            reasoning: reasoning.into(),
            issues: Vec::new(),
            verified_at: Utc::now(),
            evidence: Map::new(),
        }
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: Value) -> Self {
        self.evidence.insert(key.into(), value);
        self
    }

    /// Step status the verdict maps to.
    pub fn step_status(&self) -> ExecutionStatus {
        match self.result {
            VerificationResult::Success | VerificationResult::Partial => {
                ExecutionStatus::Completed
            }
            VerificationResult::Failed | VerificationResult::NeedsReplanning => {
                ExecutionStatus::Failed
            }
        }
    }

    pub fn requires_replan(&self) -> bool {
        matches!(
            self.result,
            VerificationResult::Failed | VerificationResult::NeedsReplanning
        )
    }
}

/// Aggregate root for one task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPlan {
    pub id: String,
    pub task_description: String,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verifications: Vec<Verification>,
    #[serde(default)]
    pub results: Vec<StepResult>,
    #[serde(default)]
    pub replanned_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_reasoning: Option<String>,
}

impl AgentPlan {
    pub fn new(
        task_description: impl Into<String>,
        steps: Vec<PlanStep>,
    ) -> Result<Self, PlanValidationError> {
        let plan = Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_description: task_description.into(),
            steps,
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            verifications: Vec::new(),
            results: Vec::new(),
            replanned_count: 0,
            final_reasoning: None,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Structural checks: task text, step ids, dependency references and acyclicity.
    pub fn validate(&self) -> Result<DependencyGraph, PlanValidationError> {
        if self.task_description.trim().is_empty() {
            return Err(PlanValidationError::EmptyTaskDescription);
        }
        DependencyGraph::from_steps(&self.steps)
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|step| step.id == id)
    }

    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), InvalidTransition> {
        self.status = self.status.checked(next, &format!("plan {}", self.id))?;
        match next {
            ExecutionStatus::Executing if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            status if status.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Bumps the replan counter and returns the new value. The counter never decreases.
    pub fn record_replan(&mut self) -> u32 {
        self.replanned_count = self.replanned_count.saturating_add(1);
        self.replanned_count
    }

    pub fn add_caveat(&mut self, caveat: impl AsRef<str>) {
        let caveat = caveat.as_ref();
        match &mut self.final_reasoning {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(caveat);
            }
            None => self.final_reasoning = Some(caveat.to_string()),
        }
    }

    /// Adopt a replanned step list. Completed steps must survive unchanged; every other
    /// step becomes a fresh pending step.
    pub fn adopt_steps(&mut self, steps: Vec<PlanStep>) -> Result<(), PlanValidationError> {
        for completed in self
            .steps
            .iter()
            .filter(|step| step.status == ExecutionStatus::Completed)
        {
            let Some(candidate) = steps.iter().find(|step| step.id == completed.id) else {
                return Err(PlanValidationError::CompletedStepDropped(
                    completed.id.clone(),
                ));
            };
            if !candidate.same_work_as(completed) {
                return Err(PlanValidationError::CompletedStepAltered(
                    completed.id.clone(),
                ));
            }
        }

        let adopted = steps
            .into_iter()
            .map(|step| match self.step(&step.id) {
                Some(existing) if existing.status == ExecutionStatus::Completed => {
                    existing.clone()
                }
                _ => step.reset_for_replan(),
            })
            .collect::<Vec<_>>();

        DependencyGraph::from_steps(&adopted)?;
        self.steps = adopted;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.status == ExecutionStatus::Completed)
    }

    pub fn count_with_status(&self, status: ExecutionStatus) -> usize {
        self.steps.iter().filter(|step| step.status == status).count()
    }

    pub fn latest_result(&self, step_id: &str) -> Option<&StepResult> {
        self.results
            .iter()
            .rev()
            .find(|result| result.step_id == step_id)
    }
}

/// Terminal summary handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub plan_id: String,
    pub final_status: ExecutionStatus,
    #[serde(default)]
    pub result: StepPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub total_duration_seconds: f64,
    pub steps_completed: usize,
    pub steps_failed: usize,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentResult {
    /// Summarise a finished plan. The consolidated result is the payload of the last
    /// completed step in plan order, or the run error when nothing completed.
    pub fn summarize(plan: &AgentPlan, total_duration_seconds: f64, error: Option<String>) -> Self {
        let last_success = plan
            .steps
            .iter()
            .rev()
            .filter(|step| step.status == ExecutionStatus::Completed)
            .find_map(|step| {
                plan.latest_result(&step.id)
                    .filter(|result| result.result.is_success())
                    .map(|result| result.result.clone())
            });

        let result = match (last_success, &error) {
            (Some(payload), _) => payload,
            (None, Some(message)) => StepPayload::Error {
                tool: None,
                message: message.clone(),
            },
            (None, None) => StepPayload::Empty,
        };

        let mut metadata = Map::new();
        metadata.insert("replannedCount".into(), Value::from(plan.replanned_count));
        metadata.insert("taskDescription".into(), Value::from(plan.task_description.clone()));
        if let Some(reasoning) = &plan.final_reasoning {
            metadata.insert("finalReasoning".into(), Value::from(reasoning.clone()));
        }

        Self {
            plan_id: plan.id.clone(),
            final_status: plan.status,
            result,
            error,
            completed_at: plan.completed_at.unwrap_or_else(Utc::now),
            total_duration_seconds,
            steps_completed: plan.count_with_status(ExecutionStatus::Completed),
            steps_failed: plan.count_with_status(ExecutionStatus::Failed),
            metadata,
        }
    }
}
