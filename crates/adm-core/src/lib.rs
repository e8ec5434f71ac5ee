//! Concurrent download coordination for turning video URLs into audio files.
//!
//! [`manager::DownloadManager`] owns the tasks and runs them on a bounded worker
//! pool; [`throttle::ProgressThrottler`] rate-limits what reaches the UI; the
//! actual fetch-and-convert is delegated to a [`fetch::FetchConverter`].

pub mod config;
pub mod logging;

pub mod control;
pub mod error;
pub mod events;
pub mod fetch;
pub mod manager;
pub mod task;
pub mod throttle;
pub mod url_model;

pub use control::CancelToken;
pub use error::AdmError;
pub use events::{ManagerEvent, ProgressSink, ProgressUpdate, RunSummary};
pub use manager::{DownloadManager, ManagerSettings, OverallProgress};
pub use task::{Task, TaskId, TaskStatus};
pub use throttle::{ProgressThrottler, ThrottleSettings, ThrottleStats};
