//! Structured events the manager delivers to the UI.
//!
//! Workers never call into the UI. Everything reaches it as a [`ManagerEvent`]
//! on an `mpsc` channel the UI drains on its own thread.

use std::sync::mpsc;

use serde::Serialize;

use crate::task::{Task, TaskId, TaskStatus};

/// Per-task payload passed through the throttler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub status: TaskStatus,
    pub progress: f64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_downloaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
}

impl ProgressUpdate {
    pub fn new(status: TaskStatus, progress: f64, url: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            url: url.into(),
            title: None,
            error: None,
            bytes_downloaded: None,
            bytes_total: None,
        }
    }

    /// Statuses the throttler always emits immediately.
    pub fn is_important(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::Converting
        )
    }
}

impl From<&Task> for ProgressUpdate {
    fn from(task: &Task) -> Self {
        let mut update = ProgressUpdate::new(task.status(), task.progress(), task.url.clone());
        if !task.title.is_empty() {
            update.title = Some(task.title.clone());
        }
        if task.is_failed() {
            update.error = Some(task.error_message().to_string());
        }
        update
    }
}

/// Counts reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub was_cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    Progress {
        task_id: TaskId,
        update: ProgressUpdate,
    },
    Log(String),
    RunFinished(RunSummary),
}

/// Receives throttled progress emissions.
///
/// Called with the throttler lock held: implementations must return quickly
/// and must not call back into the throttler.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, task_id: &str, update: ProgressUpdate);
}

impl ProgressSink for mpsc::Sender<ManagerEvent> {
    fn emit(&self, task_id: &str, update: ProgressUpdate) {
        // A dropped receiver means nobody is watching; the run carries on.
        let _ = self.send(ManagerEvent::Progress {
            task_id: task_id.to_string(),
            update,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_from_failed_task_carries_error_and_title() {
        let mut task = Task::new("task_a", "https://www.youtube.com/watch?v=aaaaaaaaaaa");
        task.set_title("Song");
        task.set_status(TaskStatus::Failed, Some("HTTP Error 403"));
        let update = ProgressUpdate::from(&task);
        assert_eq!(update.status, TaskStatus::Failed);
        assert_eq!(update.title.as_deref(), Some("Song"));
        assert_eq!(update.error.as_deref(), Some("HTTP Error 403"));
        assert!(update.is_important());
    }

    #[test]
    fn downloading_is_not_important_and_skips_empty_fields() {
        let update = ProgressUpdate::new(TaskStatus::Downloading, 12.0, "u");
        assert!(!update.is_important());
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"status":"downloading","progress":12.0,"url":"u"}"#);
    }

    #[test]
    fn channel_sink_wraps_progress_events() {
        let (tx, rx) = mpsc::channel::<ManagerEvent>();
        tx.emit("task_b", ProgressUpdate::new(TaskStatus::Converting, 90.0, "u"));
        match rx.recv().unwrap() {
            ManagerEvent::Progress { task_id, update } => {
                assert_eq!(task_id, "task_b");
                assert_eq!(update.progress, 90.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
