//! The fetch-and-convert capability the manager drives for each task.
//!
//! The manager only knows the [`FetchConverter`] trait. [`YtDlpFetcher`] is the
//! production backend: it supervises an external `yt-dlp` process that downloads
//! the media and has `ffmpeg` extract the audio track.

mod classify;
mod error;
mod ffmpeg;
mod ytdlp;

use std::path::Path;

use crate::control::CancelToken;

pub use classify::classify_stderr;
pub use error::{FailureKind, FetchError};
pub use ffmpeg::{locate_ffmpeg, probe_version, FfmpegLocation};
pub use ytdlp::{check_tools, ToolReport, YtDlpFetcher, YtDlpSettings};

/// One fetch-and-convert invocation.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    /// Folder the converted audio file is written to.
    pub output_dir: &'a Path,
    /// Poll this and return [`FetchError::Cancelled`] once it is set.
    pub cancel: &'a CancelToken,
}

/// Progress reported by a backend while it works on one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// Human-readable title became known.
    Identified { title: String },
    /// Bytes fetched so far; `bytes_total` is `None` while the size is unknown.
    Downloading {
        bytes_downloaded: u64,
        bytes_total: Option<u64>,
    },
    /// Fetch finished, audio conversion started.
    Converting,
    /// Output file is ready.
    Completed,
}

/// Receives events and log lines from a backend. Calls are synchronous and
/// must return quickly.
pub trait FetchReporter {
    fn event(&mut self, event: FetchEvent);
    fn log(&mut self, message: &str);
}

/// Downloads one URL and converts it to audio.
///
/// Implementations block until done, report through `reporter`, and stop at
/// their next checkpoint once `request.cancel` is set. Any timeout is theirs to
/// enforce and surfaces as an error.
pub trait FetchConverter: Send + Sync {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        reporter: &mut dyn FetchReporter,
    ) -> Result<(), FetchError>;
}
