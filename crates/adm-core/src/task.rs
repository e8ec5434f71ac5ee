//! One URL's fetch-and-convert unit of work.

use serde::Serialize;

use crate::error::AdmError;

/// Task identifier, unique within one manager.
pub type TaskId = String;

/// Message stored when a task fails without a usable error text.
const GENERIC_FAILURE: &str = "task failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Converting,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Converting => "converting",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled tasks never run again in the same run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A download task with its current status and progress (0.0..=100.0).
///
/// `error_message` is non-empty exactly when `status` is [`TaskStatus::Failed`].
/// Any status may follow any other; the manager decides which transitions it
/// issues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    pub title: String,
    status: TaskStatus,
    progress: f64,
    error_message: String,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: String::new(),
            status: TaskStatus::Pending,
            progress: 0.0,
            error_message: String::new(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Set progress; rejects values outside 0..=100 and leaves the task unchanged.
    pub fn update_progress(&mut self, value: f64) -> Result<(), AdmError> {
        if !(0.0..=100.0).contains(&value) {
            return Err(AdmError::InvalidProgress(value));
        }
        self.progress = value;
        Ok(())
    }

    /// Transition to `status`. Failed records `error` (or a generic message when
    /// none is given); every other status clears the stored error.
    pub fn set_status(&mut self, status: TaskStatus, error: Option<&str>) {
        self.status = status;
        if status == TaskStatus::Failed {
            self.error_message = match error.map(str::trim) {
                Some(msg) if !msg.is_empty() => msg.to_string(),
                _ => GENERIC_FAILURE.to_string(),
            };
        } else {
            self.error_message.clear();
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Put the task back to its initial state for a new run.
    pub(crate) fn reset(&mut self) {
        self.set_status(TaskStatus::Pending, None);
        self.progress = 0.0;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TaskStatus::Downloading | TaskStatus::Converting)
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == TaskStatus::Cancelled
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
