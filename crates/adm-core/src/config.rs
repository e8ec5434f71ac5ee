use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::YtDlpSettings;
use crate::manager::ManagerSettings;
use crate::throttle::ThrottleSettings;

/// Progress throttling parameters (optional `[throttle]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum gap between two emissions for one task.
    pub min_interval_ms: u64,
    /// Minimum progress change (percentage points) to emit before the force interval.
    pub min_progress_change: f64,
    /// Emit regardless of change once this much time has passed.
    pub force_update_interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 150,
            min_progress_change: 3.0,
            force_update_interval_ms: 1500,
        }
    }
}

/// Global configuration loaded from `~/.config/adm/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmConfig {
    /// Folder converted audio files are written to.
    pub download_folder: PathBuf,
    /// Number of videos processed at the same time.
    pub max_concurrent_downloads: usize,
    /// Output codec passed to yt-dlp (`mp3`, `m4a`, `opus`, ...).
    pub audio_format: String,
    /// Bitrate in kbps, or a VBR quality 0-10.
    pub audio_quality: String,
    /// Explicit ffmpeg binary; PATH is searched when missing.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit yt-dlp binary; `yt-dlp` on PATH when missing.
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,
    /// Kill yt-dlp after this many seconds per video (None = no limit).
    #[serde(default)]
    pub process_timeout_secs: Option<u64>,
    /// Optional throttling overrides; built-in defaults are used when missing.
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,
}

impl Default for AdmConfig {
    fn default() -> Self {
        Self {
            download_folder: PathBuf::from("downloads"),
            max_concurrent_downloads: 3,
            audio_format: "mp3".to_string(),
            audio_quality: "192".to_string(),
            ffmpeg_path: None,
            yt_dlp_path: None,
            process_timeout_secs: None,
            throttle: None,
        }
    }
}

impl AdmConfig {
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            max_concurrent_downloads: self.max_concurrent_downloads.max(1),
            download_folder: self.download_folder.clone(),
        }
    }

    pub fn throttle_settings(&self) -> ThrottleSettings {
        let t = self.throttle.clone().unwrap_or_default();
        ThrottleSettings {
            min_interval: Duration::from_millis(t.min_interval_ms),
            min_progress_change: t.min_progress_change.max(0.0),
            force_interval: Duration::from_millis(t.force_update_interval_ms),
        }
    }

    pub fn yt_dlp_settings(&self) -> YtDlpSettings {
        let defaults = YtDlpSettings::default();
        YtDlpSettings {
            yt_dlp_path: self.yt_dlp_path.clone().unwrap_or(defaults.yt_dlp_path),
            ffmpeg_path: self.ffmpeg_path.clone(),
            audio_format: self.audio_format.clone(),
            audio_quality: self.audio_quality.clone(),
            timeout: self.process_timeout_secs.map(Duration::from_secs),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("adm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = AdmConfig::default();
        write_default(&path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<AdmConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: AdmConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

fn write_default(path: &Path, cfg: &AdmConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml)?;
    Ok(())
}
