pub mod executor;
pub mod orchestrator;
pub mod scheduler;
pub mod verifier;

pub use executor::StepExecutor;
pub use orchestrator::{Orchestrator, TASK_ANALYSIS_KEY};
pub use scheduler::{SlotPermit, Slots, StepReport};
pub use verifier::{OutcomeChecker, VerificationCapability, Verifier, VerifyFuture};
