//! CLI command handlers. Each command is in its own file.

mod check;
mod config;
mod download;
mod extract;

pub use check::run_check;
pub use config::run_config;
pub use download::{run_download, DownloadOptions};
pub use extract::run_extract;

#[cfg(test)]
pub(crate) use download::{effective_config, format_progress, format_task_line};
#[cfg(test)]
pub(crate) use extract::unique_urls;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Collect input text blocks from arguments and an optional file; read stdin
/// when neither is given.
pub(crate) async fn read_input(text: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut blocks: Vec<String> = text.to_vec();
    if let Some(path) = file {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read URL file {}", path.display()))?;
        blocks.push(data);
    }
    if blocks.is_empty() {
        let stdin = tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map(|_| buf)
        })
        .await?
        .context("read URLs from stdin")?;
        blocks.push(stdin);
    }
    Ok(blocks)
}
