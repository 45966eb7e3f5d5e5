use crate::builder::BuildReport;
use crate::orchestrator::RunSummary;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted { classes: Vec<String> },
    ClassStarted { index: usize, total: usize, class: String },
    InstanceStarted { class: String, stem: String, index: usize, total: usize },
    InstanceFinished { report: BuildReport },
    InstanceFailed { class: String, stem: String, reason: String },
    RunFinished { summary: RunSummary },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Reports progress through `tracing`, one line per event.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { classes } => {
                info!(classes = classes.len(), "build started");
            }
            ProgressEvent::ClassStarted { index, total, class } => {
                info!("({index}/{total}) Starting class {class}");
            }
            ProgressEvent::InstanceStarted { class, stem, index, total } => {
                info!(class = %class, "({index}/{total}) Starting {stem}");
            }
            ProgressEvent::InstanceFinished { report } => {
                if report.exact_solved() {
                    warn!(
                        class = %report.class,
                        stem = %report.stem,
                        "label computed by exact solve"
                    );
                }
                info!(
                    class = %report.class,
                    stem = %report.stem,
                    computed = report.computed(),
                    skipped = report.skipped(),
                    "finished"
                );
            }
            ProgressEvent::InstanceFailed { class, stem, reason } => {
                warn!(class = %class, stem = %stem, "failed: {reason}");
            }
            ProgressEvent::RunFinished { summary } => info!(
                instances = summary.instances,
                succeeded = summary.succeeded,
                failed = summary.failures.len(),
                computed = summary.artifacts_computed,
                skipped = summary.artifacts_skipped,
                exact_solves = summary.exact_solves,
                "build finished"
            ),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = ProgressEvent::InstanceFailed {
            class: "easy".to_string(),
            stem: "b".to_string(),
            reason: "bad header".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "instance_failed");
        assert_eq!(json["stem"], "b");
    }
}
