use crate::core::planner::{
    AgentPlan, ExecutionStatus, FailureContext, PlanStep, Planner, PlannerFuture,
    PlanningContext,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk plan template: either a bare step array or an object with steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanTemplate {
    Steps(Vec<PlanStep>),
    Document {
        #[serde(default, rename = "taskDescription")]
        task_description: Option<String>,
        steps: Vec<PlanStep>,
    },
}

impl PlanTemplate {
    pub fn steps(&self) -> &[PlanStep] {
        match self {
            Self::Steps(steps) | Self::Document { steps, .. } => steps,
        }
    }

    pub fn task_description(&self) -> Option<&str> {
        match self {
            Self::Steps(_) => None,
            Self::Document {
                task_description, ..
            } => task_description.as_deref(),
        }
    }
}

/// Serves a fixed step template. On replan it re-issues the current plan with
/// every unfinished step reset to pending.
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    template: PlanTemplate,
}

impl StaticPlanner {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            template: PlanTemplate::Steps(steps),
        }
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let template = serde_json::from_str(raw).context("failed to parse plan template")?;
        Ok(Self { template })
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan template {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn template(&self) -> &PlanTemplate {
        &self.template
    }
}

impl Planner for StaticPlanner {
    fn name(&self) -> &str {
        "static"
    }

    fn generate_plan<'a>(&'a self, context: &'a PlanningContext) -> PlannerFuture<'a, AgentPlan> {
        Box::pin(async move {
            let steps = self.template.steps().to_vec();
            if steps.len() > context.max_steps {
                anyhow::bail!(
                    "plan template has {} steps but the context allows {}",
                    steps.len(),
                    context.max_steps
                );
            }

            let task = if context.has_task() {
                context.task_description.clone()
            } else {
                self.template
                    .task_description()
                    .unwrap_or_default()
                    .to_string()
            };

            AgentPlan::new(task, steps).context("plan template is not a valid plan")
        })
    }

    fn replan<'a>(
        &'a self,
        plan: &'a AgentPlan,
        failure: &'a FailureContext,
    ) -> PlannerFuture<'a, AgentPlan> {
        Box::pin(async move {
            tracing::debug!(
                plan_id = %plan.id,
                attempt = failure.attempt,
                failed = ?failure.failed_step_ids,
                "static planner re-issuing plan"
            );

            let mut next = plan.clone();
            for step in next
                .steps
                .iter_mut()
                .filter(|step| step.status != ExecutionStatus::Completed)
            {
                *step = step.reset_for_replan();
            }
            Ok(next)
        })
    }
}
