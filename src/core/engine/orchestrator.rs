use super::executor::StepExecutor;
use super::scheduler::{SlotPermit, Slots, StepReport};
use super::verifier::Verifier;
use crate::config::EngineConfig;
use crate::core::planner::{
    AgentPlan, AgentResult, DependencyGraph, ExecutionStatus, FailureContext, PlanStep, Planner,
    PlanningContext, StepResult, Verification, VerificationResult,
};
use crate::core::tools::{InvocationContext, Tool, ToolRegistry};
use crate::error::{EngineError, ToolResolutionError, ValidationError};
use crate::runtime::observability::{NoopObserver, Observer, ObserverEvent};
use crate::security::PermissionContext;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Constraint and result-metadata key holding the planner's `TaskAnalysis`.
pub const TASK_ANALYSIS_KEY: &str = "taskAnalysis";

/// Drives plans to a terminal state: dispatches ready steps, applies verdicts,
/// and replans on failure within the configured budget.
///
/// The orchestrator is the only writer of an [`AgentPlan`] while it runs. Step
/// tasks own snapshots and report back over a channel.
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    planner: Arc<dyn Planner>,
    permissions: Arc<dyn PermissionContext>,
    observer: Arc<dyn Observer>,
    executor: Arc<StepExecutor>,
    verifier: Arc<Verifier>,
    config: EngineConfig,
    active: Mutex<HashMap<String, CancellationToken>>,
}

/// Per-round scheduling state. A round ends when nothing is in flight and
/// nothing more can be dispatched.
struct Round {
    slots: Slots,
    token: CancellationToken,
    reports: mpsc::UnboundedSender<StepReport>,
    tasks: JoinSet<()>,
    running: HashMap<task::Id, String>,
    in_flight: HashSet<String>,
    failure: FailureContext,
    fatal: Option<EngineError>,
}

impl Round {
    fn accepts_dispatch(&self) -> bool {
        self.fatal.is_none() && self.failure.is_empty()
    }

    fn halt(&mut self, error: EngineError) {
        if self.fatal.is_none() {
            self.fatal = Some(error);
            self.token.cancel();
        }
    }
}

/// Removes a plan's cancellation handle once its run returns.
struct ActiveRun<'a> {
    active: &'a Mutex<HashMap<String, CancellationToken>>,
    plan_id: String,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.plan_id);
    }
}

fn set_status(plan: &mut AgentPlan, step_id: &str, status: ExecutionStatus) {
    if let Some(step) = plan.step_mut(step_id)
        && let Err(error) = step.transition(status)
    {
        tracing::warn!(plan_id = %plan.id, %error, "ignored step transition");
    }
}

fn failure_reason(result: &StepResult, verification: &Verification) -> String {
    match result.error.as_deref() {
        Some("timeout") => EngineError::ExecutionTimeout {
            step_id: result.step_id.clone(),
            timeout_ms: result
                .metadata
                .get("timeoutMs")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        }
        .to_string(),
        Some(error) => format!("step {}: {error}", result.step_id),
        None => EngineError::Verification(format!(
            "step {}: {}",
            result.step_id, verification.reasoning
        ))
        .to_string(),
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        planner: Arc<dyn Planner>,
        permissions: Arc<dyn PermissionContext>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            planner,
            permissions,
            observer: Arc::new(NoopObserver),
            executor: Arc::new(StepExecutor::from_config(&config)),
            verifier: Arc::new(Verifier::default()),
            config,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Request cancellation of a running plan. Takes effect at the next
    /// scheduling boundary; in-flight steps observe the token immediately.
    pub fn cancel(&self, plan_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(plan_id) {
            Some(token) => {
                tracing::info!(plan_id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_plans(&self) -> Vec<String> {
        let mut ids = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }

    fn track(&self, plan_id: &str, token: CancellationToken) -> ActiveRun<'_> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plan_id.to_string(), token);
        ActiveRun {
            active: &self.active,
            plan_id: plan_id.to_string(),
        }
    }

    /// Plan and run a task. Planning failures come back as a failed
    /// `AgentResult`; only a context without a task is an `Err`.
    pub async fn run_task(&self, mut context: PlanningContext) -> Result<AgentResult, EngineError> {
        if !context.has_task() {
            return Err(ValidationError::MissingTaskDescription.into());
        }
        if context.available_tools.is_empty() {
            context.available_tools = self.registry.metadata();
        }

        let started = Instant::now();
        tracing::info!(
            planner = self.planner.name(),
            task = %context.task_description,
            "planning task"
        );

        let analysis = match self.planner.analyze_task(&context).await {
            Ok(analysis) => {
                tracing::debug!(
                    complexity = analysis.estimated_complexity,
                    remote = analysis.remote_execution_advisable,
                    reasoning = %analysis.reasoning,
                    "task analysed"
                );
                serde_json::to_value(&analysis).ok()
            }
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "task analysis failed");
                None
            }
        };
        if let Some(value) = &analysis {
            context
                .constraints
                .entry(TASK_ANALYSIS_KEY)
                .or_insert_with(|| value.clone());
        }

        let generated = match self.planner.generate_plan(&context).await {
            Ok(plan) => plan
                .validate()
                .map(|_| plan)
                .map_err(|e| EngineError::Planning(format!("generated plan is invalid: {e}"))),
            Err(e) => Err(EngineError::Planning(format!("{e:#}"))),
        };

        let mut plan = match generated {
            Ok(plan) => plan,
            Err(error) => return self.planning_failed(&context, started, error),
        };
        if plan.status == ExecutionStatus::Pending {
            plan.transition(ExecutionStatus::Planning)?;
        }
        let mut result = self.run_plan(plan, &context).await?;
        if let Some(value) = analysis {
            result.metadata.insert(TASK_ANALYSIS_KEY.into(), value);
        }
        Ok(result)
    }

    fn planning_failed(
        &self,
        context: &PlanningContext,
        started: Instant,
        error: EngineError,
    ) -> Result<AgentResult, EngineError> {
        let mut plan = AgentPlan::new(context.task_description.clone(), Vec::new())?;
        plan.transition(ExecutionStatus::Planning)?;
        Ok(self.finish(plan, started, Some(error)))
    }

    /// Run an existing plan. Returns `Err` only when the plan is structurally
    /// invalid or already finished; every other outcome is an `AgentResult`.
    pub async fn run_plan(
        &self,
        mut plan: AgentPlan,
        context: &PlanningContext,
    ) -> Result<AgentResult, EngineError> {
        let graph = plan.validate()?;
        plan.transition(ExecutionStatus::Executing)?;

        let started = Instant::now();
        let deadline = context.deadline.map(|deadline| {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            started + remaining
        });
        let cancel = CancellationToken::new();
        let _active = self.track(&plan.id, cancel.clone());

        tracing::info!(
            plan_id = %plan.id,
            steps = plan.steps.len(),
            max_replans = self.config.max_replans,
            "plan started"
        );
        self.observer
            .record_event(&ObserverEvent::PlanStarted { plan: plan.clone() });

        let outcome = self.drive(&mut plan, graph, deadline, &cancel).await;
        Ok(self.finish(plan, started, outcome.err()))
    }

    async fn drive(
        &self,
        plan: &mut AgentPlan,
        mut graph: DependencyGraph,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        loop {
            let failure = self.execute_round(plan, &graph, deadline, cancel).await?;
            plan.transition(ExecutionStatus::Verifying)?;

            let Some(mut failure) = failure else {
                if plan.is_complete() {
                    plan.transition(ExecutionStatus::Completed)?;
                    return Ok(());
                }
                return Err(EngineError::Planning(format!(
                    "no runnable steps remain ({} pending)",
                    plan.count_with_status(ExecutionStatus::Pending)
                )));
            };

            if let Some(error) = Self::boundary_error(plan, deadline, cancel) {
                return Err(error);
            }
            if plan.replanned_count >= self.config.max_replans {
                tracing::warn!(
                    plan_id = %plan.id,
                    replanned = plan.replanned_count,
                    reasons = %failure.summary(),
                    "replanning budget exhausted"
                );
                return Err(EngineError::ReplanningExhausted {
                    replanned_count: plan.replanned_count,
                    max_replans: self.config.max_replans,
                });
            }

            plan.transition(ExecutionStatus::Replanning)?;
            failure.attempt = plan.record_replan();
            tracing::info!(
                plan_id = %plan.id,
                attempt = failure.attempt,
                failed = ?failure.failed_step_ids,
                "replanning"
            );

            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(EngineError::Cancelled { plan_id: plan.id.clone() });
                }
                next = self.planner.replan(plan, &failure) => {
                    next.map_err(|e| EngineError::Planning(format!("{e:#}")))?
                }
            };
            plan.adopt_steps(next.steps)
                .map_err(|e| EngineError::Planning(format!("replanned steps rejected: {e}")))?;
            graph = DependencyGraph::from_steps(&plan.steps)?;

            self.observer.record_event(&ObserverEvent::PlanReplanned {
                plan: plan.clone(),
                failure,
            });
            plan.transition(ExecutionStatus::Executing)?;
        }
    }

    fn boundary_error(
        plan: &AgentPlan,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Option<EngineError> {
        if cancel.is_cancelled() {
            return Some(EngineError::Cancelled {
                plan_id: plan.id.clone(),
            });
        }
        if deadline.is_some_and(|at| Instant::now() >= at) {
            return Some(EngineError::DeadlineExceeded {
                plan_id: plan.id.clone(),
            });
        }
        None
    }

    /// Dispatch until a trigger, a fatal error, or completion; then drain.
    /// `Ok(Some(_))` carries the replan trigger.
    async fn execute_round(
        &self,
        plan: &mut AgentPlan,
        graph: &DependencyGraph,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Option<FailureContext>, EngineError> {
        let (reports, mut inbox) = mpsc::unbounded_channel();
        let mut round = Round {
            slots: Slots::from_config(&self.config),
            token: cancel.child_token(),
            reports,
            tasks: JoinSet::new(),
            running: HashMap::new(),
            in_flight: HashSet::new(),
            failure: FailureContext::new(plan.replanned_count.saturating_add(1)),
            fatal: None,
        };
        let expiry = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));
        tokio::pin!(expiry);

        loop {
            if round.accepts_dispatch() {
                match Self::boundary_error(plan, deadline, cancel) {
                    Some(error) => round.halt(error),
                    None => self.dispatch_ready(plan, graph, &mut round),
                }
            }
            if round.in_flight.is_empty() {
                break;
            }

            tokio::select! {
                Some(report) = inbox.recv() => self.apply_report(plan, report, &mut round),
                Some(joined) = round.tasks.join_next_with_id() => match joined {
                    Ok((id, ())) => {
                        round.running.remove(&id);
                    }
                    Err(error) => self.abandon_step(plan, &error, &mut round),
                },
                () = cancel.cancelled(), if round.fatal.is_none() => {
                    round.halt(EngineError::Cancelled { plan_id: plan.id.clone() });
                }
                () = &mut expiry, if deadline.is_some() && round.fatal.is_none() => {
                    round.halt(EngineError::DeadlineExceeded { plan_id: plan.id.clone() });
                }
            }
        }

        match round.fatal {
            Some(error) => Err(error),
            None if round.failure.is_empty() => Ok(None),
            None => Ok(Some(round.failure)),
        }
    }

    /// Resolve every ready step first. Any resolution failure is recorded and
    /// nothing else starts this pass, so one replan sees all of them.
    fn dispatch_ready(&self, plan: &mut AgentPlan, graph: &DependencyGraph, round: &mut Round) {
        let mut resolved = Vec::new();
        let mut unresolved = 0_usize;

        for step_id in graph.ready_steps(&plan.steps) {
            let Some(step) = plan.step(&step_id).cloned() else {
                continue;
            };
            match self.registry.match_step(&step, self.permissions.as_ref()) {
                Ok(matches) => {
                    if let Some(best) = matches.into_iter().next() {
                        resolved.push((step, best.tool));
                    }
                }
                Err(error) => {
                    self.reject_unresolved(plan, &step, error, round);
                    unresolved += 1;
                }
            }
        }

        if unresolved > 0 {
            tracing::debug!(plan_id = %plan.id, unresolved, "dispatch stopped for replanning");
            return;
        }

        for (step, tool) in resolved {
            let Some(slot) = round.slots.try_reserve(tool.metadata().execution_context) else {
                continue;
            };
            self.start_step(plan, step, tool, slot, round);
        }
    }

    fn reject_unresolved(
        &self,
        plan: &mut AgentPlan,
        step: &PlanStep,
        error: ToolResolutionError,
        round: &mut Round,
    ) {
        let reason = EngineError::ToolResolution(error).to_string();
        tracing::warn!(plan_id = %plan.id, step_id = %step.id, %reason, "step unresolved");

        set_status(plan, &step.id, ExecutionStatus::Failed);
        let result = StepResult::failed(&step.id, step.tool_name.clone(), reason.clone());
        round.failure.record(&step.id, reason);
        round.failure.results.push(result.clone());
        plan.results.push(result.clone());

        self.observer.record_event(&ObserverEvent::StepCompleted {
            plan_id: plan.id.clone(),
            step: plan.step(&step.id).cloned().unwrap_or_else(|| step.clone()),
            result,
            verification: None,
        });
    }

    fn start_step(
        &self,
        plan: &mut AgentPlan,
        step: PlanStep,
        tool: Arc<dyn Tool>,
        slot: SlotPermit,
        round: &mut Round,
    ) {
        set_status(plan, &step.id, ExecutionStatus::Executing);
        let snapshot = plan.step(&step.id).cloned().unwrap_or(step);

        tracing::debug!(
            plan_id = %plan.id,
            step_id = %snapshot.id,
            tool = tool.name(),
            "dispatching step"
        );
        self.observer.record_event(&ObserverEvent::StepStarted {
            plan_id: plan.id.clone(),
            step: snapshot.clone(),
            tool: tool.name().to_string(),
        });

        let ctx = InvocationContext::new(&plan.id, &snapshot.id, &snapshot.action)
            .with_cancel(round.token.child_token());
        let executor = Arc::clone(&self.executor);
        let verifier = Arc::clone(&self.verifier);
        let reports = round.reports.clone();
        let step_id = snapshot.id.clone();

        let handle = round.tasks.spawn(async move {
            let parameters = snapshot.parameters.clone();
            let report = match executor
                .execute(&snapshot, tool.as_ref(), parameters, &ctx)
                .await
            {
                Ok(result) => {
                    let _ = reports.send(StepReport::Executed {
                        result: result.clone(),
                    });
                    let verification = verifier.verify(&snapshot, &result).await;
                    StepReport::Verified {
                        result,
                        verification,
                    }
                }
                Err(error) => StepReport::Rejected {
                    step_id: snapshot.id.clone(),
                    tool: tool.name().to_string(),
                    error,
                },
            };
            // Free the slot before the orchestrator sees the report.
            drop(slot);
            let _ = reports.send(report);
        });

        round.running.insert(handle.id(), step_id.clone());
        round.in_flight.insert(step_id);
    }

    fn apply_report(&self, plan: &mut AgentPlan, report: StepReport, round: &mut Round) {
        match report {
            StepReport::Executed { result } => {
                set_status(plan, &result.step_id, ExecutionStatus::Verifying);
                plan.results.push(result);
            }
            StepReport::Verified {
                result,
                verification,
            } => {
                round.in_flight.remove(&result.step_id);
                let step_id = result.step_id.clone();
                let cancelled = result.status == ExecutionStatus::Cancelled;
                let status = if cancelled {
                    ExecutionStatus::Cancelled
                } else {
                    verification.step_status()
                };
                set_status(plan, &step_id, status);
                plan.verifications.push(verification.clone());

                if verification.result == VerificationResult::Partial {
                    plan.add_caveat(format!("step {step_id}: {}", verification.reasoning));
                }
                if !cancelled && verification.requires_replan() {
                    round
                        .failure
                        .record(&step_id, failure_reason(&result, &verification));
                    round.failure.results.push(result.clone());
                    round.failure.verifications.push(verification.clone());
                }

                tracing::info!(
                    plan_id = %plan.id,
                    step_id = %step_id,
                    %status,
                    verdict = %verification.result,
                    duration_ms = result.duration_milliseconds,
                    "step finished"
                );
                let Some(step) = plan.step(&step_id).cloned() else {
                    return;
                };
                self.observer.record_event(&ObserverEvent::StepCompleted {
                    plan_id: plan.id.clone(),
                    step,
                    result,
                    verification: Some(verification),
                });
            }
            StepReport::Rejected {
                step_id,
                tool,
                error,
            } => {
                round.in_flight.remove(&step_id);
                tracing::warn!(plan_id = %plan.id, %step_id, %tool, %error, "step parameters rejected");

                set_status(plan, &step_id, ExecutionStatus::Failed);
                let result = StepResult::failed(&step_id, Some(tool), error.to_string());
                plan.results.push(result.clone());
                if let Some(step) = plan.step(&step_id).cloned() {
                    self.observer.record_event(&ObserverEvent::StepCompleted {
                        plan_id: plan.id.clone(),
                        step,
                        result,
                        verification: None,
                    });
                }
                round.halt(EngineError::Validation(error));
            }
        }
    }

    /// A step task died without reporting its verdict.
    fn abandon_step(&self, plan: &mut AgentPlan, error: &task::JoinError, round: &mut Round) {
        let Some(step_id) = round.running.remove(&error.id()) else {
            return;
        };
        if !round.in_flight.remove(&step_id) {
            return;
        }
        tracing::error!(plan_id = %plan.id, %step_id, %error, "step task aborted");

        set_status(plan, &step_id, ExecutionStatus::Failed);
        let reason = format!("step {step_id}: task aborted: {error}");
        let result = StepResult::failed(&step_id, None, reason.clone());
        plan.results.push(result.clone());
        round.failure.record(&step_id, reason);
        round.failure.results.push(result);
    }

    fn finish(&self, mut plan: AgentPlan, started: Instant, error: Option<EngineError>) -> AgentResult {
        if let Some(error) = &error {
            let terminal = match error {
                EngineError::Cancelled { .. } => ExecutionStatus::Cancelled,
                _ => ExecutionStatus::Failed,
            };
            if terminal == ExecutionStatus::Cancelled {
                for step in plan
                    .steps
                    .iter_mut()
                    .filter(|step| step.status == ExecutionStatus::Pending)
                {
                    step.status = ExecutionStatus::Cancelled;
                }
            }
            if !plan.status.is_terminal()
                && let Err(transition) = plan.transition(terminal)
            {
                tracing::warn!(plan_id = %plan.id, error = %transition, "ignored plan transition");
            }
            tracing::warn!(plan_id = %plan.id, %error, "plan ended early");
        }

        let result = AgentResult::summarize(
            &plan,
            started.elapsed().as_secs_f64(),
            error.map(|error| error.to_string()),
        );
        tracing::info!(
            plan_id = %plan.id,
            status = %result.final_status,
            completed = result.steps_completed,
            failed = result.steps_failed,
            replans = plan.replanned_count,
            "plan finished"
        );

        self.observer.record_event(&ObserverEvent::PlanFinished {
            plan,
            result: result.clone(),
        });
        self.observer.flush();
        result
    }
}
