use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `stepforge`.
///
/// Step-level failures are normally absorbed by the orchestrator and turned into
/// status transitions; the variants that end a run are rendered into
/// `AgentResult::error`. Tool and planner implementations keep using
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Input / parameters ──────────────────────────────────────────────
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    // ── Plan structure ──────────────────────────────────────────────────
    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] PlanValidationError),

    // ── Tool resolution ─────────────────────────────────────────────────
    #[error("tool resolution: {0}")]
    ToolResolution(#[from] ToolResolutionError),

    // ── Execution ───────────────────────────────────────────────────────
    #[error("step {step_id} timed out after {timeout_ms}ms")]
    ExecutionTimeout { step_id: String, timeout_ms: u64 },

    #[error("verification error: {0}")]
    Verification(String),

    // ── Lifecycle ───────────────────────────────────────────────────────
    #[error("replanning exhausted after {replanned_count} of {max_replans} attempts")]
    ReplanningExhausted {
        replanned_count: u32,
        max_replans: u32,
    },

    #[error("plan {plan_id} was cancelled")]
    Cancelled { plan_id: String },

    #[error("plan {plan_id} missed its deadline")]
    DeadlineExceeded { plan_id: String },

    #[error("planning capability failed: {0}")]
    Planning(String),

    #[error("illegal status transition: {0}")]
    Transition(#[from] InvalidTransition),

    // ── Config ──────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Errors that stop the run instead of feeding the replanning loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ToolResolution(_) | Self::ExecutionTimeout { .. } | Self::Verification(_)
        )
    }
}

// ─── Validation errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tool {tool} requires parameter '{parameter}'")]
    MissingParameter { tool: String, parameter: String },

    #[error("tool {tool} expects parameter '{parameter}' to be {expected}")]
    InvalidParameter {
        tool: String,
        parameter: String,
        expected: String,
    },

    #[error("planning context is missing a task description")]
    MissingTaskDescription,

    #[error("{0}")]
    Custom(String),
}

// ─── Plan structure errors ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanValidationError {
    #[error("plan step id cannot be empty")]
    EmptyStepId,

    #[error("duplicate plan step id: {0}")]
    DuplicateStep(String),

    #[error("step {step} depends on unknown step {dependency} (known steps: [{known}])")]
    UnknownDependency {
        step: String,
        dependency: String,
        known: String,
    },

    #[error("cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("task description cannot be empty")]
    EmptyTaskDescription,

    #[error("replanned plan dropped completed step {0}")]
    CompletedStepDropped(String),

    #[error("replanned plan altered completed step {0}")]
    CompletedStepAltered(String),
}

// ─── Tool resolution errors ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolResolutionError {
    #[error("step {step_id} is bound to unknown tool {tool}")]
    UnknownTool { step_id: String, tool: String },

    #[error("no eligible tool for step {step_id} (required: [{}])", .required.join(", "))]
    NoEligibleTool {
        step_id: String,
        required: Vec<String>,
    },

    #[error("step {step_id}: tool {tool} lacks granted permissions [{}]", .missing.join(", "))]
    PermissionsMissing {
        step_id: String,
        tool: String,
        missing: Vec<String>,
    },
}

// ─── Status transition errors ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{subject}: {from} -> {to}")]
pub struct InvalidTransition {
    pub subject: String,
    pub from: String,
    pub to: String,
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
