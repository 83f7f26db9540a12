use crate::core::planner::{AgentPlan, AgentResult, FailureContext, PlanStep, StepResult, Verification};
use serde::{Deserialize, Serialize};

/// Lifecycle events emitted by the orchestrator. Each carries full snapshots so
/// an audit sink can reconstruct the run without access to engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ObserverEvent {
    PlanStarted {
        plan: AgentPlan,
    },
    StepStarted {
        plan_id: String,
        step: PlanStep,
        tool: String,
    },
    StepCompleted {
        plan_id: String,
        step: PlanStep,
        result: StepResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verification: Option<Verification>,
    },
    PlanReplanned {
        plan: AgentPlan,
        failure: FailureContext,
    },
    PlanFinished {
        plan: AgentPlan,
        result: AgentResult,
    },
}

impl ObserverEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlanStarted { .. } => "plan.started",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::PlanReplanned { .. } => "plan.replanned",
            Self::PlanFinished { .. } => "plan.finished",
        }
    }

    pub fn plan_id(&self) -> &str {
        match self {
            Self::PlanStarted { plan } | Self::PlanReplanned { plan, .. } => &plan.id,
            Self::StepStarted { plan_id, .. } | Self::StepCompleted { plan_id, .. } => plan_id,
            Self::PlanFinished { result, .. } => &result.plan_id,
        }
    }
}

/// Core observability trait. Implement for any backend.
pub trait Observer: Send + Sync {
    /// Record a discrete event
    fn record_event(&self, event: &ObserverEvent);

    /// Flush any buffered data (no-op for most backends)
    fn flush(&self) {}

    /// Human-readable name of this observer
    fn name(&self) -> &str;
}
