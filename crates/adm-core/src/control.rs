//! Cooperative cancellation for download runs.
//!
//! A run owns one [`CancelToken`]. The pool checks it before starting each task,
//! the per-task reporter checks it on every progress event, and the fetch
//! backend polls it to stop the external tool. Nothing is killed from the
//! outside; work stops at its next checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
