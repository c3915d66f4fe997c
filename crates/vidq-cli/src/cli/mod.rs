//! CLI for the vidq download queue and worker.

mod commands;
#[cfg(unix)]
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use vidq_core::config;
use vidq_core::queue_db::QueueDb;

use commands::{
    run_add_video, run_cancel, run_completions, run_delete, run_enqueue, run_recover, run_retry,
    run_status, run_worker,
};

/// Top-level CLI for vidq.
#[derive(Debug, Parser)]
#[command(name = "vidq")]
#[command(about = "vidq: download queue and worker for trending videos", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Recover this worker's stranded jobs, then claim and run jobs until stopped.
    Worker {
        /// Exit once the backlog is empty instead of polling.
        #[arg(long)]
        once: bool,
        /// Run up to N jobs concurrently (overrides max_concurrent from the config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Register a discovered video (status `new`).
    AddVideo {
        /// Platform id of the video (unique).
        external_id: String,
        /// Canonical page URL.
        page_url: String,
        #[arg(long)]
        title: Option<String>,
        /// Already-known direct media URL; the extractor is skipped for it.
        #[arg(long, value_name = "URL")]
        direct_url: Option<String>,
    },

    /// Create a pending download job for a video.
    Enqueue {
        /// Video identifier.
        video_id: i64,
    },

    /// Create a new job for a failed video.
    Retry {
        /// Video identifier.
        video_id: i64,
        /// Refuse once the video has failed this many times.
        #[arg(long, default_value = "3", value_name = "N")]
        max_attempts: i64,
    },

    /// Show videos and download jobs.
    Status,

    /// Reset jobs this worker identity left running, then exit.
    Recover,

    /// Soft-delete a video.
    Delete {
        /// Video identifier.
        video_id: i64,
    },

    /// Cancel one in-flight job in a running worker.
    Cancel {
        /// Job identifier.
        job_id: i64,
        /// Worker identity to contact (default: this host's configured worker).
        #[arg(long, value_name = "ID")]
        worker: Option<String>,
    },

    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell);
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        if let CliCommand::Cancel { job_id, worker } = &cli.command {
            let worker_id = worker.clone().unwrap_or_else(|| cfg.effective_worker_id());
            return run_cancel(&worker_id, *job_id).await;
        }

        let db = QueueDb::open(cfg.database_path.as_deref()).await?;
        match cli.command {
            CliCommand::Worker { once, jobs } => run_worker(db, &cfg, once, jobs).await?,
            CliCommand::AddVideo {
                external_id,
                page_url,
                title,
                direct_url,
            } => run_add_video(&db, external_id, page_url, title, direct_url).await?,
            CliCommand::Enqueue { video_id } => run_enqueue(&db, video_id).await?,
            CliCommand::Retry {
                video_id,
                max_attempts,
            } => run_retry(&db, video_id, max_attempts).await?,
            CliCommand::Status => run_status(&db).await?,
            CliCommand::Recover => run_recover(&db, &cfg.effective_worker_id()).await?,
            CliCommand::Delete { video_id } => run_delete(&db, video_id).await?,
            CliCommand::Cancel { .. } | CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
