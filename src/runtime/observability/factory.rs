use super::{JsonlObserver, LogObserver, MultiObserver, NoopObserver, Observer};
use crate::config::{ObservabilityBackend, ObservabilityConfig};
use std::path::Path;
use std::sync::Arc;

/// Factory: create the right observer from config. `audit_path` is only used by
/// the jsonl backend, which also keeps logging through `tracing`.
pub fn create_observer(config: &ObservabilityConfig, audit_path: &Path) -> Arc<dyn Observer> {
    match config.backend {
        ObservabilityBackend::None => Arc::new(NoopObserver),
        ObservabilityBackend::Log => Arc::new(LogObserver::new()),
        ObservabilityBackend::Jsonl => match JsonlObserver::open(audit_path) {
            Ok(jsonl) => Arc::new(MultiObserver::new(vec![
                Box::new(LogObserver::new()),
                Box::new(jsonl),
            ])),
            Err(error) => {
                tracing::warn!(%error, "audit log unavailable, falling back to log observer");
                Arc::new(LogObserver::new())
            }
        },
    }
}
