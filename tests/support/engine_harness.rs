#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value, json};

use stepforge::config::EngineConfig;
use stepforge::core::engine::Orchestrator;
use stepforge::core::planner::{
    AgentPlan, FailureContext, PlanStep, Planner, PlannerFuture, PlanningContext,
};
use stepforge::core::tools::{
    ExecutionContextKind, InvocationContext, ParameterKind, ParameterSpec, Tool, ToolFuture,
    ToolMetadata, ToolRegistry, ToolResult,
};
use stepforge::runtime::observability::{Observer, ObserverEvent};
use stepforge::security::AllowAll;

/// Ordered record of tool start/end marks across every scripted tool.
#[derive(Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Tracks how many scripted tools run at once.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }
}

struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub enum Outcome {
    Succeed(Value),
    Fail(String),
    Error(String),
}

/// Tool with a fixed delay and outcome. Advertises its own name as a capability.
pub struct ScriptedTool {
    metadata: ToolMetadata,
    delay: Duration,
    outcome: Outcome,
    calls: AtomicUsize,
    journal: Arc<Journal>,
    gauge: Option<Arc<Gauge>>,
}

impl ScriptedTool {
    pub fn new(name: &str, journal: &Arc<Journal>) -> Self {
        Self {
            metadata: ToolMetadata::new(name, format!("scripted {name}")).with_capabilities([name]),
            delay: Duration::ZERO,
            outcome: Outcome::Succeed(json!({ "from": name })),
            calls: AtomicUsize::new(0),
            journal: Arc::clone(journal),
            gauge: None,
        }
    }

    pub fn with_context(mut self, context: ExecutionContextKind) -> Self {
        self.metadata = self.metadata.with_context(context);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.metadata = self.metadata.with_timeout_ms(timeout_ms);
        self
    }

    pub fn with_required_parameter(mut self, name: &str) -> Self {
        self.metadata = self
            .metadata
            .with_parameter(ParameterSpec::required(name, ParameterKind::Any, name));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_gauge(mut self, gauge: &Arc<Gauge>) -> Self {
        self.gauge = Some(Arc::clone(gauge));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Tool for ScriptedTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn execute<'a>(
        &'a self,
        _parameters: Map<String, Value>,
        ctx: &'a InvocationContext,
    ) -> ToolFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.journal.push(format!("start:{}", ctx.step_id));
            let _running = self.gauge.as_ref().map(Gauge::enter);
            tokio::time::sleep(self.delay).await;
            self.journal.push(format!("end:{}", ctx.step_id));

            match &self.outcome {
                Outcome::Succeed(data) => Ok(ToolResult::ok(data.clone())),
                Outcome::Fail(message) => Ok(ToolResult::fail(message.clone())),
                Outcome::Error(message) => Err(anyhow::anyhow!(message.clone())),
            }
        })
    }
}

/// Keeps every lifecycle event for later inspection.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ObserverEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(ObserverEvent::kind).collect()
    }

    pub fn final_plan(&self) -> AgentPlan {
        self.events()
            .into_iter()
            .rev()
            .find_map(|event| match event {
                ObserverEvent::PlanFinished { plan, .. } => Some(plan),
                _ => None,
            })
            .expect("no plan.finished event recorded")
    }

    pub fn replan_counts(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObserverEvent::PlanReplanned { plan, .. } => Some(plan.replanned_count),
                _ => None,
            })
            .collect()
    }

    pub fn started_steps(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObserverEvent::StepStarted { step, .. } => Some(step.id),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn record_event(&self, event: &ObserverEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Serves `initial`, then one queued step list per replan. Once the queue is
/// empty it re-issues the current steps.
pub struct ScriptedPlanner {
    initial: Vec<PlanStep>,
    replans: Mutex<VecDeque<Vec<PlanStep>>>,
}

impl ScriptedPlanner {
    pub fn new(initial: Vec<PlanStep>) -> Self {
        Self {
            initial,
            replans: Mutex::new(VecDeque::new()),
        }
    }

    pub fn then(self, steps: Vec<PlanStep>) -> Self {
        self.replans.lock().unwrap().push_back(steps);
        self
    }
}

impl Planner for ScriptedPlanner {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_plan<'a>(&'a self, context: &'a PlanningContext) -> PlannerFuture<'a, AgentPlan> {
        Box::pin(async move {
            Ok(AgentPlan::new(
                context.task_description.clone(),
                self.initial.clone(),
            )?)
        })
    }

    fn replan<'a>(
        &'a self,
        plan: &'a AgentPlan,
        _failure: &'a FailureContext,
    ) -> PlannerFuture<'a, AgentPlan> {
        Box::pin(async move {
            let steps = self
                .replans
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| plan.steps.clone());
            Ok(AgentPlan {
                steps,
                ..plan.clone()
            })
        })
    }
}

/// Step bound by capability to the scripted tool of the same name.
pub fn step(id: &str, tool: &str) -> PlanStep {
    PlanStep::new(id, format!("step {id}"), tool).with_required_tools([tool])
}

pub fn engine_config(max_replans: u32) -> EngineConfig {
    EngineConfig {
        max_replans,
        ..EngineConfig::default()
    }
}

pub fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Arc::new(registry)
}

/// Orchestrator with every permission granted and a recording observer attached.
pub fn orchestrator(
    tools: Vec<Arc<dyn Tool>>,
    planner: Arc<dyn Planner>,
    config: EngineConfig,
) -> (Orchestrator, RecordingObserver) {
    let observer = RecordingObserver::default();
    let engine = Orchestrator::new(registry(tools), planner, Arc::new(AllowAll), config)
        .with_observer(Arc::new(observer.clone()));
    (engine, observer)
}
