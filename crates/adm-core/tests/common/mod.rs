//! Shared helpers for integration tests: a scripted fetcher and event collection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use adm_core::fetch::{FetchConverter, FetchError, FetchEvent, FetchReporter, FetchRequest};
use adm_core::{DownloadManager, ManagerEvent, ProgressUpdate, RunSummary};

/// What the stub does for one URL.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Report download progress, conversion, then succeed.
    Succeed,
    /// Report some progress, then return this error.
    Fail(FetchError),
    /// Keep reporting progress until the cancel token is set.
    BlockUntilCancelled,
    /// Download fully, report conversion, then wait for [`StubFetcher::release`]
    /// or cancellation. Reports completion and succeeds either way.
    HoldWhileConverting,
    Panic(&'static str),
}

/// `FetchConverter` that follows a per-URL script instead of running yt-dlp.
pub struct StubFetcher {
    behaviors: Mutex<HashMap<String, Behavior>>,
    default: Behavior,
    step_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
    released: AtomicBool,
}

impl StubFetcher {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            default: Behavior::Succeed,
            step_delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    pub fn with_default(mut self, behavior: Behavior) -> Self {
        self.default = behavior;
        self
    }

    pub fn script(&self, url: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    /// Let every `HoldWhileConverting` fetch finish.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    /// Highest number of simultaneous `fetch` calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn behavior_for(&self, url: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FetchConverter for StubFetcher {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        reporter: &mut dyn FetchReporter,
    ) -> Result<(), FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);
        self.calls.lock().unwrap().push(request.url.to_string());

        let behavior = self.behavior_for(request.url);
        reporter.log(&format!("stub fetching {}", request.url));
        reporter.event(FetchEvent::Identified {
            title: format!("title for {}", request.url),
        });

        match behavior {
            Behavior::Panic(msg) => panic!("{msg}"),
            Behavior::BlockUntilCancelled => {
                let deadline = Instant::now() + Duration::from_secs(10);
                let mut downloaded = 0u64;
                while !request.cancel.is_cancelled() {
                    if Instant::now() > deadline {
                        return Err(FetchError::Other("never cancelled".into()));
                    }
                    downloaded = (downloaded + 1).min(99);
                    reporter.event(FetchEvent::Downloading {
                        bytes_downloaded: downloaded,
                        bytes_total: Some(100),
                    });
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(FetchError::Cancelled)
            }
            Behavior::HoldWhileConverting => {
                reporter.event(FetchEvent::Downloading {
                    bytes_downloaded: 100,
                    bytes_total: Some(100),
                });
                reporter.event(FetchEvent::Converting);
                let deadline = Instant::now() + Duration::from_secs(10);
                while !self.released.load(Ordering::SeqCst) && !request.cancel.is_cancelled() {
                    if Instant::now() > deadline {
                        return Err(FetchError::Other("never released".into()));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                reporter.event(FetchEvent::Completed);
                Ok(())
            }
            Behavior::Succeed | Behavior::Fail(_) => {
                for downloaded in [25u64, 50, 100] {
                    if request.cancel.is_cancelled() {
                        return Err(FetchError::Cancelled);
                    }
                    reporter.event(FetchEvent::Downloading {
                        bytes_downloaded: downloaded,
                        bytes_total: Some(100),
                    });
                    std::thread::sleep(self.step_delay);
                }
                if let Behavior::Fail(err) = behavior {
                    return Err(err);
                }
                reporter.event(FetchEvent::Converting);
                std::thread::sleep(self.step_delay);
                reporter.event(FetchEvent::Completed);
                Ok(())
            }
        }
    }
}

/// `https://www.youtube.com/watch?v=vid0000000N` style URL with a valid 11-char id.
pub fn video_url(n: usize) -> String {
    format!("https://www.youtube.com/watch?v=vid{n:08}")
}

/// Collect events until `RunFinished` arrives (or the timeout passes).
pub fn collect_run(
    rx: &Receiver<ManagerEvent>,
    timeout: Duration,
) -> (Vec<ManagerEvent>, Option<RunSummary>) {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(ManagerEvent::RunFinished(summary)) => return (events, Some(summary)),
            Ok(event) => events.push(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return (events, None)
            }
        }
    }
}

/// Wait for the next progress event for `task_id` that satisfies `pred`.
pub fn next_progress(
    rx: &Receiver<ManagerEvent>,
    task_id: &str,
    timeout: Duration,
    mut pred: impl FnMut(&ProgressUpdate) -> bool,
) -> Option<ProgressUpdate> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(ManagerEvent::Progress { task_id: id, update }) => {
                if id == task_id && pred(&update) {
                    return Some(update);
                }
            }
            Ok(_) => {}
            Err(_) => return None,
        }
    }
}

pub fn logs(events: &[ManagerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::Log(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Wait for `manager`'s current run to finish.
pub fn finish(manager: &DownloadManager) {
    manager.wait();
    assert!(!manager.is_running());
}
