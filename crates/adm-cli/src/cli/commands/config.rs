//! `adm config` – show where the config lives and what is in effect.

use adm_core::config::{self, AdmConfig};
use anyhow::Result;
use std::path::Path;

pub fn run_config(cfg: &AdmConfig, explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# config file: {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    let throttle = cfg.throttle_settings();
    println!(
        "# throttle: min interval {:?}, min change {:.1}%, force interval {:?}",
        throttle.min_interval, throttle.min_progress_change, throttle.force_interval
    );
    Ok(())
}
