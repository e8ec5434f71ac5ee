//! Classify yt-dlp failures from its stderr output.

use super::error::{FailureKind, FetchError};

const CONVERSION_MARKERS: [&str; 4] = ["ffmpeg", "ffprobe", "postprocess", "audio conversion"];

const NETWORK_MARKERS: [&str; 8] = [
    "network",
    "connection",
    "timed out",
    "unable to download",
    "http error",
    "name or service not known",
    "temporary failure in name resolution",
    "ssl",
];

/// Classify yt-dlp stderr text. Conversion markers win over network markers
/// because ffmpeg errors often mention the input stream URL.
pub fn classify_stderr(stderr: &str) -> FailureKind {
    let lower = stderr.to_lowercase();
    if CONVERSION_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureKind::Conversion;
    }
    if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureKind::Network;
    }
    FailureKind::Generic
}

/// Most useful line of stderr: the last `ERROR:` line, else the last non-empty line.
fn summary_line(stderr: &str) -> Option<&str> {
    let lines = || stderr.lines().map(str::trim).filter(|l| !l.is_empty());
    lines()
        .rfind(|l| l.starts_with("ERROR:"))
        .map(|l| l.trim_start_matches("ERROR:").trim())
        .or_else(|| lines().next_back())
}

/// Build the task error for a yt-dlp process that exited unsuccessfully.
pub(super) fn failure_from_exit(url: &str, stderr: &str, exit_code: Option<i32>) -> FetchError {
    let detail = match (summary_line(stderr), exit_code) {
        (Some(line), _) => line.to_string(),
        (None, Some(code)) => format!("yt-dlp exited with status {code}"),
        (None, None) => "yt-dlp was terminated by a signal".to_string(),
    };
    match classify_stderr(stderr) {
        FailureKind::Conversion => FetchError::Conversion(format!("{url}: {detail}")),
        FailureKind::Network => FetchError::Network(format!("{url}: {detail}")),
        _ => FetchError::Other(format!("error downloading {url}: {detail}")),
    }
}
