//! Per-task rate limiting of progress notifications.
//!
//! Workers can report progress far faster than a UI can draw it. The throttler
//! keeps only the freshest payload per task and decides when it is worth
//! emitting:
//!
//! - completed, failed, cancelled and converting payloads go out immediately;
//! - otherwise a payload goes out once `min_interval` has passed *and* progress
//!   moved by `min_progress_change`, or once `force_interval` has passed;
//! - anything held back is emitted by one delayed emission per task, fired by a
//!   shared timer thread, carrying whatever payload is latest at that time.
//!
//! Once a terminal payload has been emitted for a task, later payloads for it
//! are dropped until its state is cleared, so the final state is seen once.

mod timer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::events::{ProgressSink, ProgressUpdate};
use crate::task::TaskId;

use timer::DelayTimer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleSettings {
    /// Minimum time between two emissions for one task.
    pub min_interval: Duration,
    /// Minimum progress change (percentage points) for an emission before `force_interval`.
    pub min_progress_change: f64,
    /// After this long without an emission, emit regardless of change.
    pub force_interval: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(150),
            min_progress_change: 3.0,
            force_interval: Duration::from_millis(1500),
        }
    }
}

/// Snapshot of throttler bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleStats {
    pub tracked_tasks: usize,
    pub scheduled_updates: usize,
    /// Payloads handed to [`ProgressThrottler::update_progress`].
    pub raw_updates: u64,
    /// Payloads that reached the sink.
    pub emitted_updates: u64,
    /// `raw_updates` per second since the throttler was created.
    pub raw_rate: f64,
    pub emitted_rate: f64,
}

impl ThrottleStats {
    /// Share of raw payloads that never reached the sink, in `0.0..=1.0`.
    pub fn coalesced_ratio(&self) -> f64 {
        if self.raw_updates == 0 {
            return 0.0;
        }
        1.0 - self.emitted_updates as f64 / self.raw_updates as f64
    }
}

#[derive(Debug, Default)]
struct ThrottleState {
    last_emit: Option<Instant>,
    last_progress: f64,
    pending: Option<ProgressUpdate>,
    scheduled: bool,
    finished: bool,
}

impl ThrottleState {
    /// Emit the pending payload, if any. Always clears the scheduled flag.
    /// Returns whether something was emitted.
    fn flush(&mut self, sink: &dyn ProgressSink, task_id: &str, now: Instant) -> bool {
        self.scheduled = false;
        let Some(update) = self.pending.take() else {
            return false;
        };
        self.last_emit = Some(now);
        self.last_progress = update.progress;
        self.finished = update.status.is_terminal();
        sink.emit(task_id, update);
        true
    }
}

struct Inner {
    settings: ThrottleSettings,
    states: Mutex<HashMap<TaskId, ThrottleState>>,
    sink: Arc<dyn ProgressSink>,
    started: Instant,
    raw: AtomicU64,
    emitted: AtomicU64,
}

impl Inner {
    fn lock_states(&self) -> MutexGuard<'_, HashMap<TaskId, ThrottleState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, state: &mut ThrottleState, task_id: &str, now: Instant) {
        if state.flush(self.sink.as_ref(), task_id, now) {
            self.emitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn is_due(&self, state: &ThrottleState, progress: f64, now: Instant) -> bool {
        let Some(last) = state.last_emit else {
            return true;
        };
        let since = now.saturating_duration_since(last);
        let moved = (progress - state.last_progress).abs() >= self.settings.min_progress_change;
        (since >= self.settings.min_interval && moved) || since >= self.settings.force_interval
    }

    fn fire_delayed(&self, task_id: &str) {
        let mut states = self.lock_states();
        if let Some(state) = states.get_mut(task_id) {
            if state.scheduled {
                self.flush(state, task_id, Instant::now());
            }
        }
    }
}

/// Coalesces per-task progress payloads before they reach the [`ProgressSink`].
///
/// Owns one timer thread for its whole lifetime; dropping the throttler stops it.
pub struct ProgressThrottler {
    inner: Arc<Inner>,
    timer: DelayTimer,
}

impl ProgressThrottler {
    pub fn new(settings: ThrottleSettings, sink: Arc<dyn ProgressSink>) -> std::io::Result<Self> {
        let inner = Arc::new(Inner {
            settings,
            states: Mutex::new(HashMap::new()),
            sink,
            started: Instant::now(),
            raw: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
        });
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let timer = DelayTimer::spawn("adm-throttle", move |task_id| {
            if let Some(inner) = weak.upgrade() {
                inner.fire_delayed(task_id);
            }
        })?;
        tracing::debug!(?settings, "progress throttler started");
        Ok(Self { inner, timer })
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.inner.settings
    }

    /// Record `update` as the latest payload for `task_id` and emit it now or later.
    pub fn update_progress(&self, task_id: &str, update: ProgressUpdate) {
        let now = Instant::now();
        self.inner.raw.fetch_add(1, Ordering::Relaxed);
        let mut states = self.inner.lock_states();
        let state = states.entry(task_id.to_string()).or_default();
        if state.finished {
            tracing::trace!(task_id, status = %update.status, "dropping update after final state");
            return;
        }
        let important = update.is_important();
        let progress = update.progress;
        state.pending = Some(update);

        if important || self.inner.is_due(state, progress, now) {
            self.inner.flush(state, task_id, now);
        } else if !state.scheduled {
            state.scheduled = true;
            self.timer
                .schedule(task_id, now + self.inner.settings.min_interval);
        }
    }

    /// Emit the pending payload for `task_id` now, ignoring the limits.
    pub fn force_update(&self, task_id: &str) {
        let mut states = self.inner.lock_states();
        if let Some(state) = states.get_mut(task_id) {
            self.inner.flush(state, task_id, Instant::now());
        }
    }

    /// Emit every pending payload now.
    pub fn force_update_all(&self) {
        let now = Instant::now();
        let mut states = self.inner.lock_states();
        for (task_id, state) in states.iter_mut() {
            self.inner.flush(state, task_id, now);
        }
    }

    /// Forget everything about `task_id`, including a scheduled emission.
    pub fn clear_task(&self, task_id: &str) {
        let mut states = self.inner.lock_states();
        states.remove(task_id);
        self.timer.cancel(task_id);
    }

    pub fn clear_all(&self) {
        let mut states = self.inner.lock_states();
        states.clear();
        self.timer.cancel_all();
    }

    /// Bookkeeping counts plus raw and emitted rates since creation. The
    /// counters survive `clear_task`/`clear_all`.
    pub fn stats(&self) -> ThrottleStats {
        let states = self.inner.lock_states();
        let raw_updates = self.inner.raw.load(Ordering::Relaxed);
        let emitted_updates = self.inner.emitted.load(Ordering::Relaxed);
        let elapsed = self.inner.started.elapsed().as_secs_f64();
        let per_second = |n: u64| if elapsed > 0.0 { n as f64 / elapsed } else { 0.0 };
        ThrottleStats {
            tracked_tasks: states.len(),
            scheduled_updates: states.values().filter(|s| s.scheduled).count(),
            raw_updates,
            emitted_updates,
            raw_rate: per_second(raw_updates),
            emitted_rate: per_second(emitted_updates),
        }
    }
}
