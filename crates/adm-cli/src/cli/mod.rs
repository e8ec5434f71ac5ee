//! CLI for the ADM audio download manager.

mod commands;

use adm_core::config::{self, AdmConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_check, run_config, run_download, run_extract, DownloadOptions};

/// Top-level CLI for the ADM audio download manager.
#[derive(Debug, Parser)]
#[command(name = "adm")]
#[command(about = "ADM: download videos as audio files with yt-dlp and ffmpeg", long_about = None)]
pub struct Cli {
    /// Use this config file instead of ~/.config/adm/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every video URL found in the input and convert it to audio.
    Download {
        /// Text containing video URLs. Reads stdin when neither this nor --file is given.
        text: Vec<String>,

        /// Read URLs from a file (one or more per line, surrounding text is ignored).
        #[arg(long, short = 'f', value_name = "PATH")]
        file: Option<PathBuf>,

        /// Number of videos processed concurrently (overrides max_concurrent_downloads).
        #[arg(long, short = 'j', value_name = "N")]
        jobs: Option<usize>,

        /// Output folder (overrides download_folder).
        #[arg(long, short = 'o', value_name = "DIR")]
        output: Option<PathBuf>,

        /// Audio format passed to yt-dlp, e.g. mp3, m4a, opus (overrides audio_format).
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,
    },

    /// Print the normalized video URLs found in the input without downloading.
    Extract {
        /// Text containing video URLs. Reads stdin when empty.
        text: Vec<String>,
    },

    /// Check that yt-dlp and ffmpeg are installed and runnable.
    Check,

    /// Show the config file location and the effective settings.
    Config,
}

fn load_config(path: Option<&std::path::Path>) -> Result<AdmConfig> {
    match path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    }
}

impl CliCommand {
    /// Returns `Ok(false)` when the command ran but the outcome was unsuccessful
    /// (a failed download, a missing tool).
    pub async fn run_from_args() -> Result<bool> {
        let cli = Cli::parse();
        let cfg = load_config(cli.config.as_deref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Download {
                text,
                file,
                jobs,
                output,
                format,
            } => {
                let opts = DownloadOptions {
                    text,
                    file,
                    jobs,
                    output,
                    format,
                };
                run_download(&cfg, opts).await
            }
            CliCommand::Extract { text } => {
                run_extract(&text).await?;
                Ok(true)
            }
            CliCommand::Check => Ok(run_check(&cfg)),
            CliCommand::Config => {
                run_config(&cfg, cli.config.as_deref())?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests;
