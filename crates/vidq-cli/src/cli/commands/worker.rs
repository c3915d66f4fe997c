//! `vidq worker` – recover, then claim and run jobs until stopped.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use vidq_core::config::VidqConfig;
use vidq_core::queue_db::QueueDb;
use vidq_core::worker::Worker;

pub async fn run_worker(db: QueueDb, cfg: &VidqConfig, once: bool, jobs: Option<usize>) -> Result<()> {
    let mut cfg = cfg.clone();
    if let Some(n) = jobs {
        cfg.max_concurrent = n.max(1);
    }
    let worker = Worker::from_config(db, &cfg)?;

    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("stop requested");
        signal_stop.cancel();
    });

    #[cfg(unix)]
    let listener = start_control_listener(&worker);

    let summary = if once {
        worker.drain(&stop).await
    } else {
        worker.run(&stop).await
    };

    signal_task.abort();
    #[cfg(unix)]
    {
        if let Some((handle, path)) = listener {
            handle.abort();
            let _ = std::fs::remove_file(&path);
        }
    }

    let summary = summary?;
    if summary.processed() == 0 {
        println!("No queued jobs.");
    } else {
        println!(
            "Jobs: {} completed, {} failed, {} unrecorded, {} abandoned",
            summary.completed, summary.failed, summary.unrecorded, summary.abandoned
        );
    }
    Ok(())
}

#[cfg(unix)]
fn start_control_listener(worker: &Worker) -> Option<(tokio::task::JoinHandle<()>, std::path::PathBuf)> {
    use crate::cli::control_socket;

    let path = vidq_core::control::default_control_socket_path(worker.worker_id()).ok()?;
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let handle = control_socket::spawn_control_listener(worker.control(), &path).ok()?;
    tracing::debug!(path = %path.display(), "control socket listening");
    Some((handle, path))
}

/// Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
