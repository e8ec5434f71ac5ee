//! Integration tests: full runs of the download manager against a scripted fetcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use adm_core::fetch::FetchError;
use adm_core::{
    AdmError, DownloadManager, ManagerEvent, ManagerSettings, TaskStatus, ThrottleSettings,
};
use common::{
    collect_run, logs, next_progress, video_url, wait_until, Behavior, StubFetcher,
};
use tempfile::tempdir;

const RUN_TIMEOUT: Duration = Duration::from_secs(10);

fn manager(
    stub: &Arc<StubFetcher>,
    workers: usize,
    folder: &std::path::Path,
) -> (DownloadManager, std::sync::mpsc::Receiver<ManagerEvent>) {
    let settings = ManagerSettings {
        max_concurrent_downloads: workers,
        download_folder: folder.to_path_buf(),
    };
    DownloadManager::with_channel(settings, ThrottleSettings::default(), stub.clone()).unwrap()
}

#[test]
fn add_urls_dedupes_across_blocks_in_first_seen_order() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(StubFetcher::new(Duration::ZERO));
    let (m, rx) = manager(&stub, 2, dir.path());

    let first = format!("check these: {} and {}", video_url(1), video_url(2));
    let second = format!("{}\n{}", video_url(2), video_url(3));
    let ids = m.add_urls(&[first, second]).unwrap();

    assert_eq!(ids.len(), 3);
    let urls: Vec<String> = m.tasks().into_iter().map(|t| t.url).collect();
    assert_eq!(urls, vec![video_url(1), video_url(2), video_url(3)]);
    assert!(m.tasks().iter().all(|t| t.is_pending()));
    assert_eq!(
        rx.try_recv().unwrap(),
        ManagerEvent::Log("Added 3 URLs for download".into())
    );
}

#[test]
fn add_urls_rejects_empty_and_url_free_input() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(StubFetcher::new(Duration::ZERO));
    let (m, _rx) = manager(&stub, 2, dir.path());

    let empty: [&str; 0] = [];
    assert_eq!(
        m.add_urls(&empty),
        Err(AdmError::Validation("no URLs provided".into()))
    );
    assert_eq!(
        m.add_urls(&["just some words", "https://example.com/not-a-video"]),
        Err(AdmError::Validation("no valid video URLs found".into()))
    );
    assert!(m.tasks().is_empty());
    assert_eq!(m.get_overall_progress().total_tasks, 0);
}

#[test]
fn run_with_two_successes_and_one_failure() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(StubFetcher::new(Duration::from_millis(30)));
    stub.script(
        &video_url(3),
        Behavior::Fail(FetchError::Network("connection reset by peer".into())),
    );
    let (m, rx) = manager(&stub, 2, dir.path());
    let text = (1..=3).map(video_url).collect::<Vec<_>>().join("\n");
    let ids = m.add_urls(&[text]).unwrap();

    assert!(m.start_download());
    assert!(m.is_running());
    assert!(!m.start_download(), "second start while running must be refused");

    let (events, summary) = collect_run(&rx, RUN_TIMEOUT);
    m.wait();
    assert!(!m.is_running());

    let summary = summary.expect("run finished");
    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert!(!summary.was_cancelled);
    assert!(stub.max_in_flight() <= 2);

    let failed = m.get_task_status(&ids[2]).unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    assert!(failed.error_message().contains("connection reset by peer"));
    for id in &ids[..2] {
        let task = m.get_task_status(id).unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.progress(), 100.0);
        assert!(task.title.starts_with("title for "));
    }

    let overall = m.get_overall_progress();
    assert_eq!(overall.completed, 2);
    assert_eq!(overall.failed, 1);
    assert!((overall.overall_progress - 200.0 / 3.0).abs() < 1e-9);

    let lines = logs(&events);
    assert!(lines.contains(&"Download already in progress".to_string()));
    assert!(lines.contains(&"Downloads finished! Succeeded: 2, Failed: 1".to_string()));
    assert!(lines.iter().any(|l| l.starts_with(&format!("[{}] Error:", ids[2]))));

    // The last progress event of every task carries its terminal status.
    for (id, expected) in ids.iter().zip([
        TaskStatus::Completed,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ]) {
        let last = events
            .iter()
            .filter_map(|e| match e {
                ManagerEvent::Progress { task_id, update } if task_id == id => Some(update),
                _ => None,
            })
            .next_back()
            .unwrap();
        assert_eq!(last.status, expected);
    }
}

#[test]
fn cancel_mid_run_marks_active_and_queued_tasks_cancelled() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(
        StubFetcher::new(Duration::from_millis(5)).with_default(Behavior::BlockUntilCancelled),
    );
    let (m, rx) = manager(&stub, 2, dir.path());
    let text = (1..=3).map(video_url).collect::<Vec<_>>().join("\n");
    m.add_urls(&[text]).unwrap();

    assert!(m.start_download());
    assert!(wait_until(RUN_TIMEOUT, || m.get_overall_progress().active == 2));
    m.cancel_download();

    let (events, summary) = collect_run(&rx, RUN_TIMEOUT);
    m.wait();

    let summary = summary.expect("run finished");
    assert!(summary.was_cancelled);
    assert_eq!(summary.cancelled, 3);
    assert_eq!(summary.completed + summary.failed, 0);
    assert!(m.tasks().iter().all(|t| t.is_cancelled()));
    // The queued task never reached the fetcher.
    assert_eq!(stub.calls().len(), 2);

    let lines = logs(&events);
    assert!(lines.contains(&"Cancelling downloads...".to_string()));
    assert!(lines.contains(&"Downloads cancelled".to_string()));
}

#[test]
fn clear_completed_is_refused_while_running() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(
        StubFetcher::new(Duration::from_millis(5)).with_default(Behavior::BlockUntilCancelled),
    );
    let (m, rx) = manager(&stub, 1, dir.path());
    m.add_urls(&[video_url(1), video_url(2)]).unwrap();

    assert!(m.start_download());
    assert!(wait_until(RUN_TIMEOUT, || m.get_overall_progress().active == 1));
    assert_eq!(m.clear_completed_tasks(), 0);
    assert_eq!(m.tasks().len(), 2);

    m.cancel_download();
    let _ = collect_run(&rx, RUN_TIMEOUT);
    m.wait();

    assert_eq!(m.clear_completed_tasks(), 2);
    assert!(m.tasks().is_empty());
    assert_eq!(m.throttler().stats().tracked_tasks, 0);
}

#[test]
fn panicking_fetch_fails_only_its_task() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(StubFetcher::new(Duration::from_millis(1)));
    stub.script(&video_url(2), Behavior::Panic("decoder exploded"));
    let (m, rx) = manager(&stub, 2, dir.path());
    let ids = m.add_urls(&[video_url(1), video_url(2)]).unwrap();

    assert!(m.start_download());
    let (_, summary) = collect_run(&rx, RUN_TIMEOUT);
    m.wait();

    let summary = summary.expect("run finished");
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    let task = m.get_task_status(&ids[1]).unwrap();
    assert!(task.is_failed());
    assert_eq!(task.error_message(), "task panicked: decoder exploded");
}

#[test]
fn a_new_run_resets_every_task() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(StubFetcher::new(Duration::from_millis(1)));
    stub.script(&video_url(1), Behavior::Fail(FetchError::Other("private video".into())));
    let (m, rx) = manager(&stub, 2, dir.path());
    let ids = m.add_urls(&[video_url(1), video_url(2)]).unwrap();

    assert!(m.start_download());
    let _ = collect_run(&rx, RUN_TIMEOUT);
    m.wait();
    assert!(m.get_task_status(&ids[0]).unwrap().is_failed());

    stub.script(&video_url(1), Behavior::Succeed);
    assert!(m.start_download());
    let (_, summary) = collect_run(&rx, RUN_TIMEOUT);
    m.wait();

    assert_eq!(summary.unwrap().completed, 2);
    let task = m.get_task_status(&ids[0]).unwrap();
    assert!(task.is_completed());
    assert!(task.error_message().is_empty());
    assert_eq!(stub.calls().len(), 4);
}

#[test]
fn conversion_phase_is_pinned_at_ninety_and_reported_at_once() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(
        StubFetcher::new(Duration::from_millis(1)).with_default(Behavior::HoldWhileConverting),
    );
    let (m, rx) = manager(&stub, 1, dir.path());
    let ids = m.add_urls(&[video_url(1)]).unwrap();

    assert!(m.start_download());
    let converting = next_progress(&rx, &ids[0], RUN_TIMEOUT, |u| {
        u.status == TaskStatus::Converting
    })
    .expect("converting update emitted while the fetch is still held");
    assert_eq!(converting.progress, 90.0);

    let task = m.get_task_status(&ids[0]).unwrap();
    assert_eq!(task.status(), TaskStatus::Converting);
    assert_eq!(task.progress(), 90.0);
    assert_eq!(m.get_overall_progress().active, 1);

    stub.release();
    let (_, summary) = collect_run(&rx, RUN_TIMEOUT);
    m.wait();
    assert_eq!(summary.expect("run finished").completed, 1);
    let task = m.get_task_status(&ids[0]).unwrap();
    assert!(task.is_completed());
    assert_eq!(task.progress(), 100.0);
}

#[test]
fn cancel_during_conversion_wins_over_a_late_success() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(
        StubFetcher::new(Duration::from_millis(1)).with_default(Behavior::HoldWhileConverting),
    );
    let (m, rx) = manager(&stub, 1, dir.path());
    let ids = m.add_urls(&[video_url(1)]).unwrap();

    assert!(m.start_download());
    assert!(wait_until(RUN_TIMEOUT, || {
        m.get_task_status(&ids[0])
            .is_some_and(|t| t.status() == TaskStatus::Converting)
    }));
    m.cancel_download();

    let (events, summary) = collect_run(&rx, RUN_TIMEOUT);
    m.wait();

    let summary = summary.expect("run finished");
    assert!(summary.was_cancelled);
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.completed, 0);
    let task = m.get_task_status(&ids[0]).unwrap();
    assert!(task.is_cancelled());
    assert!(events.iter().all(|e| !matches!(
        e,
        ManagerEvent::Progress { update, .. } if update.status == TaskStatus::Completed
    )));
}

#[test]
fn summary_is_sent_before_the_running_flag_clears() {
    let dir = tempdir().unwrap();
    let stub = Arc::new(StubFetcher::new(Duration::ZERO));
    let (m, rx) = manager(&stub, 1, dir.path());
    m.add_urls(&[video_url(1)]).unwrap();

    for _ in 0..2 {
        assert!(m.start_download());
        assert!(wait_until(RUN_TIMEOUT, || !m.is_running()));
        let drained: Vec<ManagerEvent> = rx.try_iter().collect();
        assert!(
            matches!(drained.last(), Some(ManagerEvent::RunFinished(_))),
            "RunFinished must already be queued once the run reports idle"
        );
    }
    m.wait();
}
