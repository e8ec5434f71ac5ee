//! yt-dlp backend: download the best audio stream and convert it with ffmpeg.
//!
//! yt-dlp is asked to print machine-readable progress lines. A reader thread
//! forwards stdout over a channel so the supervising loop can poll the cancel
//! token and the timeout between lines, and kill the child when either fires.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::classify::failure_from_exit;
use super::error::FetchError;
use super::ffmpeg::{locate_ffmpeg, probe_version, FfmpegLocation};
use super::{FetchConverter, FetchEvent, FetchReporter, FetchRequest};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LINES: usize = 50;

const PROGRESS_PREFIX: &str = "adm-progress ";
const TITLE_PREFIX: &str = "adm-title ";
const POSTPROCESS_PREFIX: &str = "adm-post ";

#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    pub yt_dlp_path: PathBuf,
    pub ffmpeg_path: Option<PathBuf>,
    pub audio_format: String,
    pub audio_quality: String,
    /// Kill yt-dlp if one URL takes longer than this.
    pub timeout: Option<Duration>,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self {
            yt_dlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: None,
            audio_format: "mp3".to_string(),
            audio_quality: "192".to_string(),
            timeout: None,
        }
    }
}

/// Production [`FetchConverter`] backed by the `yt-dlp` executable.
pub struct YtDlpFetcher {
    settings: YtDlpSettings,
    ffmpeg: OnceLock<Result<FfmpegLocation, FetchError>>,
}

impl YtDlpFetcher {
    pub fn new(settings: YtDlpSettings) -> Self {
        Self {
            settings,
            ffmpeg: OnceLock::new(),
        }
    }

    pub fn settings(&self) -> &YtDlpSettings {
        &self.settings
    }

    /// ffmpeg is located once and the result reused for every task.
    fn ffmpeg(&self) -> Result<&FfmpegLocation, FetchError> {
        self.ffmpeg
            .get_or_init(|| locate_ffmpeg(self.settings.ffmpeg_path.as_deref()))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn build_args(&self, request: &FetchRequest<'_>, ffmpeg: &FfmpegLocation) -> Vec<String> {
        let output = request.output_dir.join("%(title)s.%(ext)s");
        let mut args: Vec<String> = vec![
            "--extract-audio".into(),
            "--audio-format".into(),
            self.settings.audio_format.clone(),
            "--audio-quality".into(),
            self.settings.audio_quality.clone(),
            "--format".into(),
            "bestaudio/best".into(),
            "--no-playlist".into(),
            "--newline".into(),
            "--progress".into(),
            "--no-simulate".into(),
            "--no-warnings".into(),
            "--progress-template".into(),
            format!(
                "download:{PROGRESS_PREFIX}{{\"downloaded\":%(progress.downloaded_bytes|0)s,\
                 \"total\":%(progress.total_bytes|0)s,\
                 \"estimate\":%(progress.total_bytes_estimate|0)s}}"
            ),
            "--progress-template".into(),
            format!("postprocess:{POSTPROCESS_PREFIX}%(progress.postprocessor)s %(progress.status)s"),
            "--print".into(),
            format!("before_dl:{TITLE_PREFIX}%(title)s"),
            "--output".into(),
            output.to_string_lossy().into_owned(),
        ];
        if let Some(location) = ffmpeg.ffmpeg_location_arg() {
            args.push("--ffmpeg-location".into());
            args.push(location.to_string_lossy().into_owned());
        }
        args.push("--".into());
        args.push(request.url.to_string());
        args
    }

    fn deadline_passed(&self, started: Instant) -> bool {
        self.settings
            .timeout
            .is_some_and(|limit| started.elapsed() >= limit)
    }

    fn timed_out(&self) -> FetchError {
        let secs = self.settings.timeout.map(|d| d.as_secs()).unwrap_or_default();
        FetchError::Network(format!("yt-dlp timed out after {secs}s"))
    }
}

impl FetchConverter for YtDlpFetcher {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        reporter: &mut dyn FetchReporter,
    ) -> Result<(), FetchError> {
        if request.cancel.is_cancelled() {
            reporter.log(&format!("Download cancelled before starting: {}", request.url));
            return Err(FetchError::Cancelled);
        }
        let ffmpeg = self.ffmpeg()?;
        std::fs::create_dir_all(request.output_dir).map_err(|e| {
            FetchError::Other(format!(
                "could not create download folder {}: {e}",
                request.output_dir.display()
            ))
        })?;

        let args = self.build_args(request, ffmpeg);
        tracing::debug!(url = request.url, ?args, "spawning yt-dlp");
        reporter.log(&format!("Starting download: {}", request.url));

        let mut child = Command::new(&self.settings.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.settings.yt_dlp_path, e))?;

        let (line_tx, line_rx) = mpsc::channel::<String>();
        let stdout_reader = child
            .stdout
            .take()
            .map(|out| spawn_line_reader(out, line_tx));
        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| spawn_tail_reader(err, Arc::clone(&stderr_tail)));

        let started = Instant::now();
        let mut converting = false;
        loop {
            if request.cancel.is_cancelled() {
                kill_child(&mut child);
                reporter.log(&format!("Download cancelled: {}", request.url));
                return Err(FetchError::Cancelled);
            }
            if self.deadline_passed(started) {
                kill_child(&mut child);
                return Err(self.timed_out());
            }
            match line_rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => handle_line(&line, &mut converting, reporter),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if request.cancel.is_cancelled() {
                        kill_child(&mut child);
                        return Err(FetchError::Cancelled);
                    }
                    if self.deadline_passed(started) {
                        kill_child(&mut child);
                        return Err(self.timed_out());
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    kill_child(&mut child);
                    return Err(FetchError::Other(format!("waiting for yt-dlp failed: {e}")));
                }
            }
        };
        for reader in [stdout_reader, stderr_reader].into_iter().flatten() {
            let _ = reader.join();
        }

        if request.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if status.success() {
            reporter.log(&format!("Download completed: {}", request.url));
            reporter.event(FetchEvent::Completed);
            return Ok(());
        }
        let stderr_text = {
            let mut tail = stderr_tail.lock().unwrap_or_else(PoisonError::into_inner);
            tail.make_contiguous().join("\n")
        };
        Err(failure_from_exit(request.url, &stderr_text, status.code()))
    }
}

/// One line of yt-dlp stdout, as far as the backend cares.
#[derive(Debug, Clone, PartialEq)]
enum OutputLine {
    Progress {
        downloaded: u64,
        total: Option<u64>,
    },
    Title(String),
    PostprocessStarted,
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct RawProgress {
    #[serde(default)]
    downloaded: Option<f64>,
    #[serde(default)]
    total: Option<f64>,
    #[serde(default)]
    estimate: Option<f64>,
}

fn parse_line(line: &str) -> OutputLine {
    let line = line.trim();
    if let Some(json) = line.strip_prefix(PROGRESS_PREFIX) {
        return match serde_json::from_str::<RawProgress>(json) {
            Ok(raw) => {
                let positive = |v: Option<f64>| v.filter(|n| n.is_finite() && *n > 0.0);
                OutputLine::Progress {
                    downloaded: positive(raw.downloaded).unwrap_or_default() as u64,
                    total: positive(raw.total)
                        .or_else(|| positive(raw.estimate))
                        .map(|n| n as u64),
                }
            }
            Err(_) => OutputLine::Other,
        };
    }
    if let Some(title) = line.strip_prefix(TITLE_PREFIX) {
        return OutputLine::Title(title.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix(POSTPROCESS_PREFIX) {
        let mut parts = rest.split_whitespace();
        let processor = parts.next().unwrap_or_default();
        let status = parts.next().unwrap_or_default();
        if processor.eq_ignore_ascii_case("ExtractAudio") && status == "started" {
            return OutputLine::PostprocessStarted;
        }
        return OutputLine::Other;
    }
    if line.starts_with("[ExtractAudio]") {
        return OutputLine::PostprocessStarted;
    }
    OutputLine::Other
}

fn handle_line(line: &str, converting: &mut bool, reporter: &mut dyn FetchReporter) {
    match parse_line(line) {
        OutputLine::Progress { downloaded, total } => {
            if !*converting {
                reporter.event(FetchEvent::Downloading {
                    bytes_downloaded: downloaded,
                    bytes_total: total,
                });
            }
        }
        OutputLine::Title(title) => {
            reporter.log(&format!("Title: {title}"));
            reporter.event(FetchEvent::Identified { title });
        }
        OutputLine::PostprocessStarted => {
            if !*converting {
                *converting = true;
                reporter.log("Converting to audio");
                reporter.event(FetchEvent::Converting);
            }
        }
        OutputLine::Other => tracing::trace!(line, "yt-dlp output"),
    }
}

fn spawn_error(program: &Path, e: std::io::Error) -> FetchError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FetchError::ToolMissing(format!(
            "{} not found; install yt-dlp or set yt_dlp_path in the config",
            program.display()
        ))
    } else {
        FetchError::Other(format!("failed to start {}: {e}", program.display()))
    }
}

fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "yt-dlp already exited");
    }
    let _ = child.wait();
}

fn spawn_line_reader<R: Read + Send + 'static>(
    stream: R,
    tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn spawn_tail_reader<R: Read + Send + 'static>(
    stream: R,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            tracing::debug!(line = %line, "yt-dlp stderr");
            let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
            tail.push_back(line);
            if tail.len() > STDERR_TAIL_LINES {
                tail.pop_front();
            }
        }
    })
}

/// Availability of the external tools, for diagnostics.
#[derive(Debug, Clone)]
pub struct ToolReport {
    pub yt_dlp: Result<String, String>,
    pub ffmpeg: Result<String, String>,
}

impl ToolReport {
    pub fn all_available(&self) -> bool {
        self.yt_dlp.is_ok() && self.ffmpeg.is_ok()
    }
}

/// Probe yt-dlp and ffmpeg the same way a fetch would.
pub fn check_tools(settings: &YtDlpSettings) -> ToolReport {
    let yt_dlp = probe_version(&settings.yt_dlp_path, "--version")
        .map(|v| format!("{} {v}", settings.yt_dlp_path.display()))
        .ok_or_else(|| format!("{} not found", settings.yt_dlp_path.display()));
    let ffmpeg = locate_ffmpeg(settings.ffmpeg_path.as_deref())
        .map_err(|e| e.to_string())
        .and_then(|loc| {
            let program = loc
                .ffmpeg_location_arg()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("ffmpeg"));
            probe_version(&program, "-version")
                .ok_or_else(|| format!("{} does not run", program.display()))
        });
    ToolReport { yt_dlp, ffmpeg }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::CancelToken;

    #[derive(Default)]
    struct Collect {
        events: Vec<FetchEvent>,
        logs: Vec<String>,
    }

    impl FetchReporter for Collect {
        fn event(&mut self, event: FetchEvent) {
            self.events.push(event);
        }
        fn log(&mut self, message: &str) {
            self.logs.push(message.to_string());
        }
    }

    #[test]
    fn parses_progress_lines() {
        assert_eq!(
            parse_line(r#"adm-progress {"downloaded":512,"total":2048,"estimate":0}"#),
            OutputLine::Progress {
                downloaded: 512,
                total: Some(2048)
            }
        );
        assert_eq!(
            parse_line(r#"adm-progress {"downloaded":512,"total":0,"estimate":4096.7}"#),
            OutputLine::Progress {
                downloaded: 512,
                total: Some(4096)
            }
        );
        assert_eq!(
            parse_line(r#"adm-progress {"downloaded":0,"total":0,"estimate":0}"#),
            OutputLine::Progress {
                downloaded: 0,
                total: None
            }
        );
        assert_eq!(parse_line("adm-progress {not json"), OutputLine::Other);
    }

    #[test]
    fn parses_title_and_postprocess_lines() {
        assert_eq!(
            parse_line("adm-title Never Gonna Give You Up"),
            OutputLine::Title("Never Gonna Give You Up".into())
        );
        assert_eq!(
            parse_line("adm-post ExtractAudio started"),
            OutputLine::PostprocessStarted
        );
        assert_eq!(parse_line("adm-post ExtractAudio finished"), OutputLine::Other);
        assert_eq!(
            parse_line("[ExtractAudio] Destination: downloads/x.mp3"),
            OutputLine::PostprocessStarted
        );
        assert_eq!(parse_line("[youtube] Extracting URL"), OutputLine::Other);
    }

    #[test]
    fn progress_after_conversion_is_ignored_and_converting_sent_once() {
        let mut sink = Collect::default();
        let mut converting = false;
        handle_line(r#"adm-progress {"downloaded":1,"total":2}"#, &mut converting, &mut sink);
        handle_line("adm-post ExtractAudio started", &mut converting, &mut sink);
        handle_line("[ExtractAudio] Destination: a.mp3", &mut converting, &mut sink);
        handle_line(r#"adm-progress {"downloaded":2,"total":2}"#, &mut converting, &mut sink);
        assert_eq!(
            sink.events,
            vec![
                FetchEvent::Downloading {
                    bytes_downloaded: 1,
                    bytes_total: Some(2)
                },
                FetchEvent::Converting,
            ]
        );
    }

    #[test]
    fn args_carry_format_output_and_url() {
        let fetcher = YtDlpFetcher::new(YtDlpSettings {
            audio_quality: "320".into(),
            ..YtDlpSettings::default()
        });
        let cancel = CancelToken::new();
        let request = FetchRequest {
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            output_dir: Path::new("/tmp/adm-out"),
            cancel: &cancel,
        };
        let args = fetcher.build_args(
            &request,
            &FfmpegLocation::Configured(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
        );
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("--audio-format") + 1], "mp3");
        assert_eq!(args[pos("--audio-quality") + 1], "320");
        assert_eq!(args[pos("--output") + 1], "/tmp/adm-out/%(title)s.%(ext)s");
        assert_eq!(args[pos("--ffmpeg-location") + 1], "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(args.last().unwrap(), request.url);
        assert!(args.iter().any(|a| a.starts_with("download:adm-progress {")));
    }

    #[test]
    fn cancelled_request_never_spawns() {
        let fetcher = YtDlpFetcher::new(YtDlpSettings {
            yt_dlp_path: PathBuf::from("adm-definitely-not-a-real-binary"),
            ..YtDlpSettings::default()
        });
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = Collect::default();
        let request = FetchRequest {
            url: "u",
            output_dir: Path::new("/tmp"),
            cancel: &cancel,
        };
        assert_eq!(fetcher.fetch(&request, &mut sink), Err(FetchError::Cancelled));
        assert!(sink.events.is_empty());
    }

    #[test]
    fn missing_binary_is_tool_missing() {
        let err = spawn_error(
            Path::new("yt-dlp"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, FetchError::ToolMissing(_)));
        let err = spawn_error(
            Path::new("yt-dlp"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, FetchError::Other(_)));
    }
}
