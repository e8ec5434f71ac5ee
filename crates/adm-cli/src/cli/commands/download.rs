//! `adm download` – extract URLs, run the download manager, print progress.

use adm_core::config::AdmConfig;
use adm_core::fetch::YtDlpFetcher;
use adm_core::{DownloadManager, ManagerEvent, ProgressUpdate, RunSummary, Task, TaskStatus};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use super::read_input;

#[derive(Debug, Default)]
pub struct DownloadOptions {
    pub text: Vec<String>,
    pub file: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub output: Option<PathBuf>,
    pub format: Option<String>,
}

/// Apply command-line overrides on top of the loaded config.
pub(crate) fn effective_config(cfg: &AdmConfig, opts: &DownloadOptions) -> AdmConfig {
    let mut cfg = cfg.clone();
    if let Some(jobs) = opts.jobs {
        cfg.max_concurrent_downloads = jobs.max(1);
    }
    if let Some(output) = &opts.output {
        cfg.download_folder = output.clone();
    }
    if let Some(format) = &opts.format {
        cfg.audio_format = format.clone();
    }
    cfg
}

/// Returns `Ok(true)` when every task completed.
pub async fn run_download(cfg: &AdmConfig, opts: DownloadOptions) -> Result<bool> {
    let blocks = read_input(&opts.text, opts.file.as_deref()).await?;
    let cfg = effective_config(cfg, &opts);

    let fetcher = Arc::new(YtDlpFetcher::new(cfg.yt_dlp_settings()));
    let (manager, rx) =
        DownloadManager::with_channel(cfg.manager_settings(), cfg.throttle_settings(), fetcher)?;
    let manager = Arc::new(manager);
    let ids = manager.add_urls(&blocks[..])?;
    tracing::info!("queued {} task(s)", ids.len());

    let mut printer = tokio::task::spawn_blocking(move || print_events(rx));
    if !manager.start_download() {
        bail!("could not start downloads");
    }

    let summary = tokio::select! {
        res = &mut printer => res?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling downloads...");
            manager.cancel_download();
            printer.await?
        }
    };
    let waiter = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || waiter.wait()).await?;
    let stats = manager.throttler().stats();
    tracing::info!(
        raw = stats.raw_updates,
        emitted = stats.emitted_updates,
        raw_per_sec = stats.raw_rate,
        emitted_per_sec = stats.emitted_rate,
        "progress throttling"
    );

    println!();
    for task in manager.tasks() {
        println!("{}", format_task_line(&task));
    }
    let summary = summary.unwrap_or_default();
    Ok(summary.failed == 0 && !summary.was_cancelled)
}

/// Print events until the run finishes. `None` if the channel closed first.
fn print_events(rx: Receiver<ManagerEvent>) -> Option<RunSummary> {
    while let Ok(event) = rx.recv() {
        match event {
            ManagerEvent::Progress { task_id, update } => {
                println!("{}", format_progress(&task_id, &update));
            }
            ManagerEvent::Log(line) => println!("{line}"),
            ManagerEvent::RunFinished(summary) => return Some(summary),
        }
    }
    None
}

pub(crate) fn format_progress(task_id: &str, update: &ProgressUpdate) -> String {
    let name = update.title.as_deref().unwrap_or(&update.url);
    let mut line = format!(
        "{:<11} {:>5.1}%  {}  ({})",
        update.status.as_str(),
        update.progress,
        name,
        task_id
    );
    if let (Some(done), Some(total)) = (update.bytes_downloaded, update.bytes_total) {
        line.push_str(&format!(
            "  {:.1} / {:.1} MiB",
            done as f64 / 1_048_576.0,
            total as f64 / 1_048_576.0
        ));
    }
    if let Some(error) = &update.error {
        line.push_str(&format!("  error: {error}"));
    }
    line
}

pub(crate) fn format_task_line(task: &Task) -> String {
    let name = if task.title.is_empty() {
        task.url.as_str()
    } else {
        task.title.as_str()
    };
    match task.status() {
        TaskStatus::Failed => format!("{:<11} {}  {}", "failed", name, task.error_message()),
        status => format!("{:<11} {}", status.as_str(), name),
    }
}
