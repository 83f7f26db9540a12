use crate::core::planner::{
    ExecutionStatus, PlanStep, StepPayload, StepResult, Verification, VerificationResult,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

pub type VerifyFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Verification>> + Send + 'a>>;

/// Pluggable judgement over a completed step result.
pub trait VerificationCapability: Send + Sync {
    fn name(&self) -> &str;

    fn judge<'a>(&'a self, step: &'a PlanStep, result: &'a StepResult) -> VerifyFuture<'a>;
}

/// Deterministic default: trusts the tool's own success flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeChecker;

impl VerificationCapability for OutcomeChecker {
    fn name(&self) -> &str {
        "outcome"
    }

    fn judge<'a>(&'a self, step: &'a PlanStep, result: &'a StepResult) -> VerifyFuture<'a> {
        Box::pin(async move {
            let verification = match &result.result {
                StepPayload::Success { tool, data } if !data.is_null() => Verification::new(
                    &step.id,
                    VerificationResult::Success,
                    format!("{tool} reported success"),
                ),
                StepPayload::Success { tool, .. } => Verification::new(
                    &step.id,
                    VerificationResult::Partial,
                    format!("{tool} succeeded without output"),
                )
                .with_issue("empty result"),
                StepPayload::Error { message, .. } => {
                    Verification::new(&step.id, VerificationResult::Failed, "tool reported an error")
                        .with_issue(message.clone())
                }
                StepPayload::Empty => {
                    Verification::new(&step.id, VerificationResult::Partial, "no payload recorded")
                        .with_issue("empty result")
                }
            };
            Ok(verification)
        })
    }
}

type VerdictKey = (String, DateTime<Utc>);

/// Routes results to a verification capability and memoises verdicts per
/// `(step id, executed at)`.
pub struct Verifier {
    default: Arc<dyn VerificationCapability>,
    overrides: HashMap<String, Arc<dyn VerificationCapability>>,
    verdicts: Mutex<HashMap<VerdictKey, Verification>>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(Arc::new(OutcomeChecker))
    }
}

impl Verifier {
    pub fn new(default: Arc<dyn VerificationCapability>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// Use `capability` for every result produced by `tool`.
    pub fn with_override(
        mut self,
        tool: impl Into<String>,
        capability: Arc<dyn VerificationCapability>,
    ) -> Self {
        self.overrides.insert(tool.into(), capability);
        self
    }

    fn capability_for(&self, result: &StepResult) -> &Arc<dyn VerificationCapability> {
        result
            .tool()
            .and_then(|tool| self.overrides.get(tool))
            .unwrap_or(&self.default)
    }

    fn cached(&self, key: &VerdictKey) -> Option<Verification> {
        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub async fn verify(&self, step: &PlanStep, result: &StepResult) -> Verification {
        let key = (result.step_id.clone(), result.executed_at);
        if let Some(verification) = self.cached(&key) {
            return verification;
        }

        let verification = match result.status {
            ExecutionStatus::Failed | ExecutionStatus::Cancelled => Verification::new(
                &step.id,
                VerificationResult::Failed,
                format!("step {}", result.status),
            )
            .with_issue(result.error.clone().unwrap_or_else(|| result.status.to_string())),
            _ => {
                let capability = self.capability_for(result);
                match capability.judge(step, result).await {
                    Ok(mut verification) => {
                        verification.step_id.clone_from(&step.id);
                        verification
                    }
                    Err(error) => {
                        tracing::warn!(
                            step_id = %step.id,
                            capability = capability.name(),
                            error = %error,
                            "verification capability failed"
                        );
                        Verification::new(&step.id, VerificationResult::Failed, "verification error")
                            .with_issue(format!("{error:#}"))
                            .with_evidence("capability", json!(capability.name()))
                    }
                }
            }
        };

        // First stored verdict wins.
        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(verification)
            .clone()
    }

    pub fn verdict_count(&self) -> usize {
        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
