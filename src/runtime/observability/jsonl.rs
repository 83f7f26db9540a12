use super::traits::{Observer, ObserverEvent};
use anyhow::Context;
use chrono::Utc;
use serde_json::{Value, json};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Append-only JSON lines audit sink. One object per event:
/// `{"timestamp": .., "event": "planStarted", ..snapshot fields}`.
pub struct JsonlObserver {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlObserver {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(event: &ObserverEvent) -> serde_json::Result<String> {
        let mut line = serde_json::to_value(event)?;
        if let Value::Object(fields) = &mut line {
            fields.insert("timestamp".into(), json!(Utc::now()));
        }
        serde_json::to_string(&line)
    }
}

impl Observer for JsonlObserver {
    fn record_event(&self, event: &ObserverEvent) {
        let line = match Self::render(event) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(%error, kind = event.kind(), "failed to serialize audit event");
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = writeln!(writer, "{line}") {
            tracing::warn!(path = %self.path.display(), %error, "failed to append audit event");
        }
        // Terminal events are flushed eagerly so a crash loses at most one run.
        if matches!(event, ObserverEvent::PlanFinished { .. })
            && let Err(error) = writer.flush()
        {
            tracing::warn!(path = %self.path.display(), %error, "failed to flush audit log");
        }
    }

    fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = writer.flush() {
            tracing::warn!(path = %self.path.display(), %error, "failed to flush audit log");
        }
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

impl Drop for JsonlObserver {
    fn drop(&mut self) {
        let writer = self.writer.get_mut().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.flush();
    }
}
