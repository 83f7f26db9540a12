use crate::config::EngineConfig;
use crate::core::planner::{StepResult, Verification};
use crate::core::tools::ExecutionContextKind;
use crate::error::ValidationError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Concurrency budget for one plan run: an overall cap plus a tighter cap for
/// steps that leave the machine.
#[derive(Debug, Clone)]
pub struct Slots {
    parallel: Arc<Semaphore>,
    remote: Arc<Semaphore>,
}

/// Held by a running step; dropping it frees the slot.
#[derive(Debug)]
pub struct SlotPermit {
    _parallel: OwnedSemaphorePermit,
    _remote: Option<OwnedSemaphorePermit>,
}

impl Slots {
    pub fn new(max_parallel: usize, max_remote: usize) -> Self {
        Self {
            parallel: Arc::new(Semaphore::new(max_parallel.max(1))),
            remote: Arc::new(Semaphore::new(max_remote.max(1))),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_parallel_steps, config.max_remote_in_flight)
    }

    /// Non-blocking: `None` when the step has to wait for a running one to finish.
    pub fn try_reserve(&self, context: ExecutionContextKind) -> Option<SlotPermit> {
        let parallel = Arc::clone(&self.parallel).try_acquire_owned().ok()?;
        let remote = if context.is_remote_like() {
            Some(Arc::clone(&self.remote).try_acquire_owned().ok()?)
        } else {
            None
        };
        Some(SlotPermit {
            _parallel: parallel,
            _remote: remote,
        })
    }

    pub fn available(&self) -> usize {
        self.parallel.available_permits()
    }

    pub fn remote_available(&self) -> usize {
        self.remote.available_permits()
    }
}

/// Messages a step task sends back to the orchestrator.
#[derive(Debug)]
pub enum StepReport {
    /// Tool returned (or timed out, or was cancelled); verification pending.
    Executed { result: StepResult },
    Verified {
        result: StepResult,
        verification: Verification,
    },
    /// Parameters were rejected before the tool ran.
    Rejected {
        step_id: String,
        tool: String,
        error: ValidationError,
    },
}
