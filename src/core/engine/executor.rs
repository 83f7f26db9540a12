use crate::config::EngineConfig;
use crate::core::planner::{PlanStep, StepResult};
use crate::core::tools::{InvocationContext, Tool, ToolResult};
use crate::error::ValidationError;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::time::Instant;

enum Outcome {
    Finished(anyhow::Result<ToolResult>),
    TimedOut,
    Cancelled,
}

/// Runs one step against one resolved tool under a timeout and the plan's
/// cancellation token.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    default_timeout: Duration,
}

impl StepExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.default_step_timeout())
    }

    /// The tool's declared timeout, else the configured ceiling.
    pub fn effective_timeout(&self, tool: &dyn Tool) -> Duration {
        tool.metadata().timeout().unwrap_or(self.default_timeout)
    }

    /// Parameter validation runs first; a rejected step never reaches the tool.
    /// Every other outcome, including timeout and cancellation, is a `StepResult`.
    pub async fn execute(
        &self,
        step: &PlanStep,
        tool: &dyn Tool,
        parameters: Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<StepResult, ValidationError> {
        tool.validate_parameters(&parameters)?;

        let tool_name = tool.name().to_string();
        let timeout = self.effective_timeout(tool);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let executed_at = Utc::now();
        let started = Instant::now();

        tracing::debug!(
            plan_id = %ctx.plan_id,
            step_id = %step.id,
            tool = %tool_name,
            timeout_ms,
            "executing step"
        );

        let outcome = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Outcome::Cancelled,
            finished = tokio::time::timeout(timeout, tool.execute(parameters, ctx)) => {
                finished.map_or(Outcome::TimedOut, Outcome::Finished)
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = match outcome {
            Outcome::Finished(Ok(ToolResult {
                success: true, data, ..
            })) => StepResult::completed(&step.id, &tool_name, data),
            Outcome::Finished(Ok(ToolResult { data, error, .. })) => {
                let failed = StepResult::failed(
                    &step.id,
                    Some(tool_name.clone()),
                    error.unwrap_or_else(|| "tool reported failure".into()),
                );
                if data.is_null() {
                    failed
                } else {
                    failed.with_metadata("data", data)
                }
            }
            Outcome::Finished(Err(error)) => {
                StepResult::failed(&step.id, Some(tool_name.clone()), format!("{error:#}"))
            }
            Outcome::TimedOut => {
                tracing::warn!(step_id = %step.id, tool = %tool_name, timeout_ms, "step timed out");
                StepResult::failed(&step.id, Some(tool_name.clone()), "timeout")
            }
            Outcome::Cancelled => StepResult::cancelled(&step.id, Some(tool_name.clone())),
        };

        Ok(result
            .with_executed_at(executed_at)
            .with_duration_ms(duration_ms)
            .with_metadata("tool", json!(tool_name))
            .with_metadata(
                "executionContext",
                json!(tool.metadata().execution_context.to_string()),
            )
            .with_metadata("timeoutMs", json!(timeout_ms)))
    }
}
