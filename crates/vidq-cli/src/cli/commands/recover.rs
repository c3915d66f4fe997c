//! `vidq recover` – reset this worker identity's stranded jobs.

use anyhow::Result;
use vidq_core::queue_db::QueueDb;

pub async fn run_recover(db: &QueueDb, worker_id: &str) -> Result<()> {
    let n = db.recover_worker_jobs(worker_id).await?;
    println!("Recovered {n} job(s) for {worker_id}");
    Ok(())
}
