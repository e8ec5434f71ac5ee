//! Execute one task: drive the fetcher and map its events onto the task.

use crate::control::CancelToken;
use crate::events::ProgressUpdate;
use crate::fetch::{FetchError, FetchEvent, FetchReporter, FetchRequest};
use crate::task::{Task, TaskStatus};

use super::Shared;

/// Share of the bar given to the download phase; conversion pins it at 90.
const DOWNLOAD_WEIGHT: f64 = 80.0;
const CONVERTING_PROGRESS: f64 = 90.0;
const COMPLETED_PROGRESS: f64 = 100.0;

/// Run the fetcher for `task_id` and return the task's final status.
pub(super) fn execute(shared: &Shared, task_id: &str, cancel: &CancelToken) -> TaskStatus {
    if cancel.is_cancelled() {
        return mark_cancelled(shared, task_id);
    }
    let started = shared.with_task(task_id, |task| {
        if task.is_terminal() {
            return None;
        }
        task.set_status(TaskStatus::Downloading, None);
        set_progress(task, 0.0);
        Some((task.url.clone(), ProgressUpdate::from(&*task)))
    });
    let Some(Some((url, update))) = started else {
        return final_status(shared, task_id);
    };
    shared.emit(task_id, update);
    tracing::debug!(task = %task_id, %url, "task started");

    let request = FetchRequest {
        url: &url,
        output_dir: &shared.settings.download_folder,
        cancel,
    };
    let mut reporter = TaskReporter {
        shared,
        task_id,
        cancel,
    };
    let result = shared.fetcher.fetch(&request, &mut reporter);
    finish(shared, task_id, cancel, result)
}

/// Apply the fetcher's result unless the task already reached a terminal state.
fn finish(
    shared: &Shared,
    task_id: &str,
    cancel: &CancelToken,
    result: Result<(), FetchError>,
) -> TaskStatus {
    match result {
        _ if cancel.is_cancelled() => mark_cancelled(shared, task_id),
        Err(FetchError::Cancelled) => mark_cancelled(shared, task_id),
        Ok(()) => {
            transition(shared, task_id, |task| {
                task.set_status(TaskStatus::Completed, None);
                set_progress(task, COMPLETED_PROGRESS);
            });
            final_status(shared, task_id)
        }
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(task = %task_id, kind = ?e.kind(), error = %message, "task failed");
            fail(shared, task_id, &message)
        }
    }
}

pub(super) fn mark_cancelled(shared: &Shared, task_id: &str) -> TaskStatus {
    transition(shared, task_id, |task| {
        task.set_status(TaskStatus::Cancelled, None)
    });
    final_status(shared, task_id)
}

pub(super) fn fail(shared: &Shared, task_id: &str, message: &str) -> TaskStatus {
    let failed = transition(shared, task_id, |task| {
        task.set_status(TaskStatus::Failed, Some(message))
    });
    if failed {
        shared.log(format!("[{task_id}] Error: {message}"));
    }
    final_status(shared, task_id)
}

/// Apply `change` to a non-terminal task and emit the result. Returns whether
/// the task changed.
fn transition(shared: &Shared, task_id: &str, change: impl FnOnce(&mut Task)) -> bool {
    let update = shared
        .with_task(task_id, |task| {
            if task.is_terminal() {
                return None;
            }
            change(task);
            Some(ProgressUpdate::from(&*task))
        })
        .flatten();
    match update {
        Some(update) => {
            shared.emit(task_id, update);
            true
        }
        None => false,
    }
}

fn final_status(shared: &Shared, task_id: &str) -> TaskStatus {
    shared
        .with_task(task_id, |task| task.status())
        .unwrap_or(TaskStatus::Cancelled)
}

fn set_progress(task: &mut Task, value: f64) {
    if let Err(e) = task.update_progress(value.clamp(0.0, 100.0)) {
        tracing::warn!(task = %task.id, error = %e, "progress rejected");
    }
}

/// Download-phase progress: fraction of bytes scaled to the download share,
/// or 0 while the size is unknown.
fn download_progress(bytes_downloaded: u64, bytes_total: Option<u64>) -> f64 {
    match bytes_total {
        Some(total) if total > 0 => {
            (bytes_downloaded as f64 / total as f64).min(1.0) * DOWNLOAD_WEIGHT
        }
        _ => 0.0,
    }
}

/// Binds fetcher callbacks to one task.
struct TaskReporter<'a> {
    shared: &'a Shared,
    task_id: &'a str,
    cancel: &'a CancelToken,
}

impl FetchReporter for TaskReporter<'_> {
    fn event(&mut self, event: FetchEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let update = self
            .shared
            .with_task(self.task_id, |task| {
                if task.is_terminal() {
                    return None;
                }
                let update = match event {
                    FetchEvent::Identified { title } => {
                        task.set_title(title);
                        ProgressUpdate::from(&*task)
                    }
                    FetchEvent::Downloading {
                        bytes_downloaded,
                        bytes_total,
                    } => {
                        task.set_status(TaskStatus::Downloading, None);
                        set_progress(task, download_progress(bytes_downloaded, bytes_total));
                        let mut update = ProgressUpdate::from(&*task);
                        update.bytes_downloaded = Some(bytes_downloaded);
                        update.bytes_total = bytes_total;
                        update
                    }
                    FetchEvent::Converting => {
                        task.set_status(TaskStatus::Converting, None);
                        set_progress(task, CONVERTING_PROGRESS);
                        ProgressUpdate::from(&*task)
                    }
                    FetchEvent::Completed => {
                        task.set_status(TaskStatus::Completed, None);
                        set_progress(task, COMPLETED_PROGRESS);
                        ProgressUpdate::from(&*task)
                    }
                };
                Some(update)
            })
            .flatten();
        if let Some(update) = update {
            self.shared.emit(self.task_id, update);
        }
    }

    fn log(&mut self, message: &str) {
        self.shared.log(format!("[{}] {message}", self.task_id));
    }
}
