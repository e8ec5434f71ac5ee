//! Locate the external tools the yt-dlp backend depends on.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::error::FetchError;

/// Where yt-dlp should find ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfmpegLocation {
    /// An explicitly configured binary (passed to yt-dlp as `--ffmpeg-location`).
    Configured(PathBuf),
    /// `ffmpeg` on PATH; yt-dlp finds it itself.
    System,
}

impl FfmpegLocation {
    pub fn ffmpeg_location_arg(&self) -> Option<&Path> {
        match self {
            FfmpegLocation::Configured(path) => Some(path),
            FfmpegLocation::System => None,
        }
    }
}

/// Prefer the configured binary when it exists; otherwise probe PATH.
pub fn locate_ffmpeg(configured: Option<&Path>) -> Result<FfmpegLocation, FetchError> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(FfmpegLocation::Configured(path.to_path_buf()));
        }
        tracing::warn!(
            path = %path.display(),
            "configured ffmpeg_path does not exist; trying PATH"
        );
    }
    if probe_version(Path::new("ffmpeg"), "-version").is_some() {
        return Ok(FfmpegLocation::System);
    }
    Err(FetchError::ToolMissing(
        "ffmpeg not found; install it or set ffmpeg_path in the config".to_string(),
    ))
}

/// First line of `<program> <flag>` output, or `None` if it cannot run or fails.
pub fn probe_version(program: &Path, flag: &str) -> Option<String> {
    let output = Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Some(text.lines().next().unwrap_or_default().trim().to_string())
}
