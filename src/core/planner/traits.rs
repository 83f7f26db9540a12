use crate::core::planner::{AgentPlan, FailureContext, PlanningContext, TaskAnalysis};
use std::future::Future;
use std::pin::Pin;

pub type PlannerFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Planning capability. Turns a task into steps and repairs plans after failures.
///
/// The engine treats implementations as opaque; an LLM-backed planner and the
/// bundled [`StaticPlanner`](crate::core::planner::StaticPlanner) are interchangeable.
pub trait Planner: Send + Sync {
    fn name(&self) -> &str;

    fn generate_plan<'a>(&'a self, context: &'a PlanningContext) -> PlannerFuture<'a, AgentPlan>;

    /// Produce the next plan after `failure`. Completed steps of `plan` must come
    /// back unchanged or the engine rejects the result.
    fn replan<'a>(
        &'a self,
        plan: &'a AgentPlan,
        failure: &'a FailureContext,
    ) -> PlannerFuture<'a, AgentPlan>;

    /// Optional pre-planning estimate. The default scales with the task text and
    /// the number of tools on offer.
    fn analyze_task<'a>(&'a self, context: &'a PlanningContext) -> PlannerFuture<'a, TaskAnalysis> {
        Box::pin(async move {
            let words = context.task_description.split_whitespace().count();
            let complexity = (words / 8 + 1).clamp(
                usize::from(TaskAnalysis::MIN_COMPLEXITY),
                usize::from(TaskAnalysis::MAX_COMPLEXITY),
            );
            let remote = context
                .available_tools
                .iter()
                .any(|tool| tool.execution_context.is_remote_like());

            Ok(TaskAnalysis::new(
                u8::try_from(complexity).unwrap_or(TaskAnalysis::MAX_COMPLEXITY),
                format!("{words} words across {} tools", context.available_tools.len()),
            )?
            .with_remote_execution(remote))
        })
    }
}
