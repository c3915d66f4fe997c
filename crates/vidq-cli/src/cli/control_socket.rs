//! Control socket: server (during `vidq worker`) and client (for `vidq cancel`).
//! Protocol: one line per command, `cancel <job_id>`; the server answers each
//! line with `ok` (job was in flight and is being cancelled), `unknown`, or `error`.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use vidq_core::control::JobControl;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed `cancel <id>` line; None for anything else.
pub(crate) fn parse_cancel(line: &str) -> Option<i64> {
    let rest = line.trim().strip_prefix("cancel ")?;
    rest.trim().parse().ok()
}

/// Spawns a task that listens on `path` and calls `job_control.request_abort(id)`
/// for each `cancel <id>` line.
pub fn spawn_control_listener(
    job_control: Arc<JobControl>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let control = Arc::clone(&job_control);
                    tokio::spawn(serve(stream, control));
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve(stream: UnixStream, control: Arc<JobControl>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = match parse_cancel(&line) {
            Some(id) if control.request_abort(id) => {
                tracing::info!(job_id = id, "cancel requested over control socket");
                "ok\n"
            }
            Some(_) => "unknown\n",
            None => "error\n",
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Answer to a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelReply {
    pub cancelled: bool,
}

/// Sends `cancel <job_id>` to the control socket and waits for the answer.
pub async fn send_cancel(socket_path: &Path, job_id: i64) -> Result<CancelReply> {
    let stream = UnixStream::connect(socket_path).await?;
    let (read, mut write) = stream.into_split();
    write.write_all(format!("cancel {job_id}\n").as_bytes()).await?;

    let mut lines = BufReader::new(read).lines();
    let reply = tokio::time::timeout(REPLY_TIMEOUT, lines.next_line())
        .await
        .map_err(|_| anyhow::anyhow!("no reply from worker within {}s", REPLY_TIMEOUT.as_secs()))??;
    match reply.as_deref().map(str::trim) {
        Some("ok") => Ok(CancelReply { cancelled: true }),
        Some("unknown") => Ok(CancelReply { cancelled: false }),
        other => bail!("unexpected reply from worker: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cancel_lines() {
        assert_eq!(parse_cancel("cancel 42"), Some(42));
        assert_eq!(parse_cancel("  cancel  7 \n"), Some(7));
        assert_eq!(parse_cancel("cancel x"), None);
        assert_eq!(parse_cancel("pause 3"), None);
    }

    #[tokio::test]
    async fn cancel_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let control = Arc::new(JobControl::new());
        let token = control.register(5);

        let handle = spawn_control_listener(Arc::clone(&control), &path).unwrap();

        let reply = send_cancel(&path, 5).await.unwrap();
        assert!(reply.cancelled);
        assert!(token.is_cancelled());

        let reply = send_cancel(&path, 6).await.unwrap();
        assert!(!reply.cancelled);
        handle.abort();
    }
}
