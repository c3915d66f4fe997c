//! `vidq cancel <job_id>` – ask a running worker to cancel one job.

use anyhow::Result;

#[cfg(unix)]
pub async fn run_cancel(worker_id: &str, job_id: i64) -> Result<()> {
    use anyhow::Context;

    use crate::cli::control_socket;

    let path = vidq_core::control::default_control_socket_path(worker_id)?;
    if !path.exists() {
        anyhow::bail!("worker {worker_id} is not running (no control socket at {})", path.display());
    }
    let reply = control_socket::send_cancel(&path, job_id)
        .await
        .with_context(|| format!("contact worker {worker_id}"))?;
    if reply.cancelled {
        println!("Cancel requested for job {job_id}");
    } else {
        anyhow::bail!("job {job_id} is not running in worker {worker_id}");
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn run_cancel(_worker_id: &str, _job_id: i64) -> Result<()> {
    anyhow::bail!("cancel needs a unix control socket")
}
