//! Per-task failure taxonomy.

use thiserror::Error;

/// Why a single fetch-and-convert failed. Contained to the task that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// yt-dlp or ffmpeg is not installed / not executable.
    #[error("external tool missing: {0}")]
    ToolMissing(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("{0}")]
    Other(String),
    /// Stopped because the run was cancelled. A normal terminal state, not a failure.
    #[error("download cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ToolMissing,
    Network,
    Conversion,
    Generic,
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::ToolMissing(_) => FailureKind::ToolMissing,
            FetchError::Network(_) => FailureKind::Network,
            FetchError::Conversion(_) => FailureKind::Conversion,
            FetchError::Other(_) => FailureKind::Generic,
            FetchError::Cancelled => FailureKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
