//! Aggregate progress across every task of a manager.

use serde::Serialize;

use crate::task::{Task, TaskStatus};

/// Snapshot of all tasks' states (CLI/UI-friendly).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OverallProgress {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Downloading or converting.
    pub active: usize,
    pub pending: usize,
    /// Percentage in 0.0..=100.0.
    pub overall_progress: f64,
}

impl OverallProgress {
    /// Completed tasks count as 100 and active tasks contribute their own
    /// progress. Pending, failed and cancelled tasks add nothing but still
    /// count in the denominator.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut out = OverallProgress::default();
        let mut weighted = 0.0;
        for task in tasks {
            out.total_tasks += 1;
            match task.status() {
                TaskStatus::Completed => {
                    out.completed += 1;
                    weighted += 100.0;
                }
                TaskStatus::Failed => out.failed += 1,
                TaskStatus::Cancelled => out.cancelled += 1,
                TaskStatus::Pending => out.pending += 1,
                TaskStatus::Downloading | TaskStatus::Converting => {
                    out.active += 1;
                    weighted += task.progress();
                }
            }
        }
        if out.total_tasks > 0 {
            out.overall_progress = weighted / out.total_tasks as f64;
        }
        out
    }

    pub fn is_finished(&self) -> bool {
        self.active == 0 && self.pending == 0
    }
}
