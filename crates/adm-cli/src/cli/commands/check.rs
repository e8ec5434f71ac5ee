//! `adm check` – report whether yt-dlp and ffmpeg can be run.

use adm_core::config::AdmConfig;
use adm_core::fetch::check_tools;

pub fn run_check(cfg: &AdmConfig) -> bool {
    let report = check_tools(&cfg.yt_dlp_settings());
    for (name, status) in [("yt-dlp", &report.yt_dlp), ("ffmpeg", &report.ffmpeg)] {
        match status {
            Ok(version) => println!("{:<7} ok       {}", name, version),
            Err(reason) => println!("{:<7} MISSING  {}", name, reason),
        }
    }
    if !report.all_available() {
        tracing::warn!("external tools missing: {:?}", report);
    }
    report.all_available()
}
