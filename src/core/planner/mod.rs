mod context;
mod dependency_graph;
mod static_planner;
mod traits;
mod types;

pub use context::{
    DEFAULT_MAX_STEPS, FailureContext, PlanningContext, ResourceEstimate, TaskAnalysis,
    TaskCapabilities,
};
pub use dependency_graph::DependencyGraph;
pub use static_planner::{PlanTemplate, StaticPlanner};
pub use traits::{Planner, PlannerFuture};
pub use types::{
    AgentPlan, AgentResult, ExecutionStatus, PlanStep, StepPayload, StepResult, Verification,
    VerificationResult,
};
