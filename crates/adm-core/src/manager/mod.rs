//! Download manager: owns the tasks, runs them on a bounded worker pool and
//! reports progress through the throttler.
//!
//! All collaborators are passed in explicitly. The manager state lives behind
//! one mutex; the manager never holds it while calling into the throttler.

mod pool;
mod progress;
mod worker;

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::control::CancelToken;
use crate::error::AdmError;
use crate::events::{ManagerEvent, ProgressUpdate};
use crate::fetch::FetchConverter;
use crate::task::{Task, TaskId, TaskStatus};
use crate::throttle::{ProgressThrottler, ThrottleSettings};
use crate::url_model::{youtube_video_id, UrlExtractor, YoutubeUrlExtractor};

pub use progress::OverallProgress;

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Worker threads per run; values below 1 are treated as 1.
    pub max_concurrent_downloads: usize,
    pub download_folder: PathBuf,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            download_folder: PathBuf::from("downloads"),
        }
    }
}

struct ManagerState {
    tasks: HashMap<TaskId, Task>,
    /// Insertion order of `tasks`.
    order: Vec<TaskId>,
    running: bool,
    /// Token of the current (or last) run; replaced at every start.
    cancel: CancelToken,
}

/// State shared between the manager handle, the run thread and the workers.
pub(crate) struct Shared {
    settings: ManagerSettings,
    state: Mutex<ManagerState>,
    throttler: Arc<ProgressThrottler>,
    fetcher: Arc<dyn FetchConverter>,
    events: Sender<ManagerEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on one task under the state lock. `None` if the task is gone.
    fn with_task<R>(&self, task_id: &str, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        self.lock().tasks.get_mut(task_id).map(f)
    }

    fn log(&self, message: impl Into<String>) {
        let _ = self.events.send(ManagerEvent::Log(message.into()));
    }

    fn emit(&self, task_id: &str, update: ProgressUpdate) {
        self.throttler.update_progress(task_id, update);
    }
}

/// Coordinates download tasks. Cheap to share behind an `Arc`; every method
/// takes `&self`.
pub struct DownloadManager {
    shared: Arc<Shared>,
    extractor: Arc<dyn UrlExtractor>,
    seq: AtomicU64,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadManager {
    /// `throttler` must emit into the same channel as `events`.
    pub fn new(
        settings: ManagerSettings,
        fetcher: Arc<dyn FetchConverter>,
        throttler: Arc<ProgressThrottler>,
        events: Sender<ManagerEvent>,
    ) -> Self {
        let settings = ManagerSettings {
            max_concurrent_downloads: settings.max_concurrent_downloads.max(1),
            ..settings
        };
        Self {
            shared: Arc::new(Shared {
                settings,
                state: Mutex::new(ManagerState {
                    tasks: HashMap::new(),
                    order: Vec::new(),
                    running: false,
                    cancel: CancelToken::new(),
                }),
                throttler,
                fetcher,
                events,
            }),
            extractor: Arc::new(YoutubeUrlExtractor),
            seq: AtomicU64::new(0),
            run_handle: Mutex::new(None),
        }
    }

    /// Build a manager and its throttler over a fresh event channel.
    pub fn with_channel(
        settings: ManagerSettings,
        throttle: ThrottleSettings,
        fetcher: Arc<dyn FetchConverter>,
    ) -> std::io::Result<(Self, Receiver<ManagerEvent>)> {
        let (tx, rx) = mpsc::channel::<ManagerEvent>();
        let throttler = Arc::new(ProgressThrottler::new(throttle, Arc::new(tx.clone()))?);
        Ok((Self::new(settings, fetcher, throttler, tx), rx))
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn UrlExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.shared.settings
    }

    pub fn throttler(&self) -> &Arc<ProgressThrottler> {
        &self.shared.throttler
    }

    /// Extract URLs from each text block and create one pending task per unique
    /// URL. Returns the new task ids in first-seen order.
    pub fn add_urls<S: AsRef<str>>(&self, blocks: &[S]) -> Result<Vec<TaskId>, AdmError> {
        if blocks.iter().all(|b| b.as_ref().trim().is_empty()) {
            return Err(AdmError::Validation("no URLs provided".to_string()));
        }
        let mut seen = HashSet::new();
        let urls: Vec<String> = blocks
            .iter()
            .flat_map(|b| self.extractor.extract(b.as_ref()))
            .filter(|u| seen.insert(u.clone()))
            .collect();
        if urls.is_empty() {
            return Err(AdmError::Validation("no valid video URLs found".to_string()));
        }

        let ids: Vec<TaskId> = {
            let mut state = self.shared.lock();
            urls.into_iter()
                .map(|url| {
                    let id = self.next_task_id(&url);
                    state.order.push(id.clone());
                    state.tasks.insert(id.clone(), Task::new(id.clone(), url));
                    id
                })
                .collect()
        };
        tracing::info!(count = ids.len(), "added urls");
        self.shared.log(format!("Added {} URLs for download", ids.len()));
        Ok(ids)
    }

    fn next_task_id(&self, url: &str) -> TaskId {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        match youtube_video_id(url) {
            Some(video) => format!("task_{video}_{seq}"),
            None => {
                let mut hasher = DefaultHasher::new();
                url.hash(&mut hasher);
                format!("task_{:08x}_{seq}", hasher.finish() as u32)
            }
        }
    }

    /// Start a run over every task. Returns immediately; `false` when a run is
    /// already active, there is nothing to download, or the run thread could
    /// not be started.
    pub fn start_download(&self) -> bool {
        let (ids, cancel) = {
            let mut state = self.shared.lock();
            if state.running {
                drop(state);
                self.shared.log("Download already in progress");
                return false;
            }
            if state.tasks.is_empty() {
                drop(state);
                self.shared.log("No URLs to download");
                return false;
            }
            state.cancel = CancelToken::new();
            for task in state.tasks.values_mut() {
                task.reset();
            }
            state.running = true;
            (state.order.clone(), state.cancel.clone())
        };
        for id in &ids {
            self.shared.throttler.clear_task(id);
        }

        let folder = self.shared.settings.download_folder.display().to_string();
        tracing::info!(tasks = ids.len(), folder = %folder, "starting run");
        self.shared
            .log(format!("Starting download of {} videos...", ids.len()));
        self.shared.log(format!("Download folder: {folder}"));

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("adm-run".to_string())
            .spawn(move || pool::run_pool(shared, ids, cancel));
        match spawned {
            Ok(handle) => {
                let previous = self
                    .run_handle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(handle);
                if let Some(previous) = previous {
                    let _ = previous.join();
                }
                true
            }
            Err(e) => {
                self.shared.lock().running = false;
                tracing::error!(error = %e, "failed to spawn run thread");
                self.shared.log(format!("Could not start downloads: {e}"));
                false
            }
        }
    }

    /// Request cancellation of the current run. Active tasks are marked
    /// cancelled right away; queued tasks are skipped by the workers.
    pub fn cancel_download(&self) {
        let cancelled: Vec<(TaskId, ProgressUpdate)> = {
            let mut state = self.shared.lock();
            if !state.running {
                return;
            }
            state.cancel.cancel();
            let ManagerState { tasks, order, .. } = &mut *state;
            let mut cancelled = Vec::new();
            for id in order.iter() {
                let Some(task) = tasks.get_mut(id) else {
                    continue;
                };
                if task.is_active() {
                    task.set_status(TaskStatus::Cancelled, None);
                    cancelled.push((id.clone(), ProgressUpdate::from(&*task)));
                }
            }
            cancelled
        };
        tracing::info!(active = cancelled.len(), "cancelling run");
        self.shared.log("Cancelling downloads...");
        for (id, update) in cancelled {
            self.shared.emit(&id, update);
        }
    }

    pub fn get_overall_progress(&self) -> OverallProgress {
        let state = self.shared.lock();
        OverallProgress::from_tasks(state.tasks.values())
    }

    /// Snapshot of one task.
    pub fn get_task_status(&self, task_id: &str) -> Option<Task> {
        self.shared.lock().tasks.get(task_id).cloned()
    }

    /// Snapshot of every task in insertion order.
    pub fn tasks(&self) -> Vec<Task> {
        let state = self.shared.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect()
    }

    /// Remove completed, failed and cancelled tasks. Does nothing while a run
    /// is active.
    pub fn clear_completed_tasks(&self) -> usize {
        let removed: Vec<TaskId> = {
            let mut state = self.shared.lock();
            if state.running {
                return 0;
            }
            let ManagerState { tasks, order, .. } = &mut *state;
            let removed: Vec<TaskId> = order
                .iter()
                .filter(|id| tasks.get(*id).is_some_and(Task::is_terminal))
                .cloned()
                .collect();
            for id in &removed {
                tasks.remove(id);
            }
            order.retain(|id| tasks.contains_key(id));
            removed
        };
        for id in &removed {
            self.shared.throttler.clear_task(id);
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "cleared finished tasks");
        }
        removed.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Block until the current run thread exits. Returns at once when no run
    /// was started.
    pub fn wait(&self) {
        let handle = self
            .run_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("run thread panicked");
            }
        }
    }
}
