//! Keyed delay timer backed by a single thread.
//!
//! Each key has at most one deadline. Scheduling an existing key moves its
//! deadline instead of adding a second one, so load never grows the number of
//! threads or pending wakeups beyond the number of keys.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Default)]
struct TimerState {
    deadlines: HashMap<String, Instant>,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs `on_fire(key)` on the timer thread once a key's deadline passes.
/// The callback runs with the timer lock released.
pub(crate) struct DelayTimer {
    shared: Arc<TimerShared>,
    handle: Option<JoinHandle<()>>,
}

impl DelayTimer {
    pub(crate) fn spawn<F>(name: &str, on_fire: F) -> std::io::Result<Self>
    where
        F: Fn(&str) + Send + 'static,
    {
        let shared = Arc::new(TimerShared::default());
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_timer(&thread_shared, on_fire))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Set (or move) the deadline for `key`.
    pub(crate) fn schedule(&self, key: &str, deadline: Instant) {
        let mut state = self.shared.lock();
        state.deadlines.insert(key.to_string(), deadline);
        drop(state);
        self.shared.wake.notify_one();
    }

    pub(crate) fn cancel(&self, key: &str) {
        self.shared.lock().deadlines.remove(key);
    }

    pub(crate) fn cancel_all(&self) {
        self.shared.lock().deadlines.clear();
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.shared.lock().deadlines.len()
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("delay timer thread panicked");
            }
        }
    }
}

fn run_timer<F>(shared: &TimerShared, on_fire: F)
where
    F: Fn(&str),
{
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }
        let now = Instant::now();
        let due: Vec<String> = state
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        if !due.is_empty() {
            for key in &due {
                state.deadlines.remove(key);
            }
            drop(state);
            for key in &due {
                on_fire(key);
            }
            state = shared.lock();
            continue;
        }
        let next_deadline = state.deadlines.values().min().copied();
        state = match next_deadline {
            Some(next) => {
                shared
                    .wake
                    .wait_timeout(state, next.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
