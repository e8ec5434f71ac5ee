//! Bounded worker pool for one run.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use crate::control::CancelToken;
use crate::events::{ManagerEvent, RunSummary};
use crate::task::{TaskId, TaskStatus};

use super::worker;
use super::Shared;

/// Clears the manager's running flag when dropped, including on panic.
struct RunGuard<'a> {
    shared: &'a Shared,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock().running = false;
    }
}

/// Run every task in `ids` with at most `max_concurrent_downloads` workers,
/// then flush pending progress, report the summary and clear the running flag.
/// The summary is sent before the flag clears so it precedes any later run's
/// events on the channel.
pub(super) fn run_pool(shared: Arc<Shared>, ids: Vec<TaskId>, cancel: CancelToken) {
    let _guard = RunGuard { shared: &shared };
    let summary = run_workers(&shared, ids, &cancel);
    shared.throttler.force_update_all();

    if summary.was_cancelled {
        tracing::info!(?summary, "run cancelled");
        shared.log("Downloads cancelled");
    } else {
        tracing::info!(?summary, "run finished");
        shared.log(format!(
            "Downloads finished! Succeeded: {}, Failed: {}",
            summary.completed, summary.failed
        ));
    }
    let _ = shared.events.send(ManagerEvent::RunFinished(summary));
}

fn run_workers(shared: &Arc<Shared>, ids: Vec<TaskId>, cancel: &CancelToken) -> RunSummary {
    let count = ids.len();
    let work: Arc<Mutex<VecDeque<TaskId>>> = Arc::new(Mutex::new(ids.into_iter().collect()));
    let (tx, rx) = mpsc::channel::<(TaskId, TaskStatus)>();
    let num_workers = shared.settings.max_concurrent_downloads.min(count);
    let mut handles = Vec::with_capacity(num_workers);
    for n in 0..num_workers {
        let work = Arc::clone(&work);
        let tx = tx.clone();
        let shared = Arc::clone(shared);
        let cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("adm-worker-{n}"))
            .spawn(move || loop {
                let next = work.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                let Some(task_id) = next else { break };
                let status = run_one(&shared, &task_id, &cancel);
                if tx.send((task_id, status)).is_err() {
                    break;
                }
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => tracing::error!(worker = n, error = %e, "failed to spawn worker"),
        }
    }
    drop(tx);

    let mut summary = RunSummary {
        total: count,
        ..RunSummary::default()
    };
    let mut received = 0usize;
    while received < count {
        let Ok((task_id, status)) = rx.recv() else {
            break;
        };
        received += 1;
        tracing::debug!(task = %task_id, %status, "task finished");
        match status {
            TaskStatus::Completed => summary.completed += 1,
            TaskStatus::Cancelled => summary.cancelled += 1,
            _ => summary.failed += 1,
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }

    // Tasks still queued here had no worker to run them.
    let stranded: Vec<TaskId> = work
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();
    for task_id in stranded {
        match worker::fail(shared, &task_id, "no worker thread available") {
            TaskStatus::Cancelled => summary.cancelled += 1,
            _ => summary.failed += 1,
        }
    }

    summary.was_cancelled = cancel.is_cancelled();
    summary
}

/// Execute one task; a panic in the fetcher fails only that task.
fn run_one(shared: &Shared, task_id: &str, cancel: &CancelToken) -> TaskStatus {
    if cancel.is_cancelled() {
        return worker::mark_cancelled(shared, task_id);
    }
    match panic::catch_unwind(AssertUnwindSafe(|| worker::execute(shared, task_id, cancel))) {
        Ok(status) => status,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(task = %task_id, %detail, "task panicked");
            worker::fail(shared, task_id, &format!("task panicked: {detail}"))
        }
    }
}
