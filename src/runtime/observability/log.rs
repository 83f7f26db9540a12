use super::traits::{Observer, ObserverEvent};
use tracing::{info, warn};

/// Log-based observer backed by `tracing`
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::PlanStarted { plan } => {
                info!(
                    plan_id = %plan.id,
                    steps = plan.steps.len(),
                    task = %plan.task_description,
                    "plan.started"
                );
            }
            ObserverEvent::StepStarted {
                plan_id,
                step,
                tool,
            } => {
                info!(plan_id = %plan_id, step_id = %step.id, tool = %tool, "step.started");
            }
            ObserverEvent::StepCompleted {
                plan_id,
                step,
                result,
                verification,
            } => {
                let verdict = verification
                    .as_ref()
                    .map_or_else(|| "unverified".to_string(), |v| v.result.to_string());
                info!(
                    plan_id = %plan_id,
                    step_id = %step.id,
                    status = %result.status,
                    duration_ms = result.duration_milliseconds,
                    verdict = %verdict,
                    error = ?result.error,
                    "step.completed"
                );
            }
            ObserverEvent::PlanReplanned { plan, failure } => {
                warn!(
                    plan_id = %plan.id,
                    replanned_count = plan.replanned_count,
                    failed = ?failure.failed_step_ids,
                    reasons = %failure.summary(),
                    "plan.replanned"
                );
            }
            ObserverEvent::PlanFinished { result, .. } => {
                info!(
                    plan_id = %result.plan_id,
                    status = %result.final_status,
                    completed = result.steps_completed,
                    failed = result.steps_failed,
                    duration_secs = result.total_duration_seconds,
                    error = ?result.error,
                    "plan.finished"
                );
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
