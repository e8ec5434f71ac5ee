//! Errors surfaced synchronously to callers of the manager and task model.
//!
//! Failures that happen while a task runs are [`crate::fetch::FetchError`]s and
//! stay contained in that task; only input problems come back through here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdmError {
    /// No usable URLs were submitted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Progress value outside 0..=100 (or NaN).
    #[error("progress must be between 0.0 and 100.0, got {0}")]
    InvalidProgress(f64),
}
