//! `vidq enqueue <video_id>` – create a pending download job.

use anyhow::{bail, Result};
use vidq_core::queue_db::{EnqueueOutcome, JobPayload, QueueDb};

pub async fn run_enqueue(db: &QueueDb, video_id: i64) -> Result<()> {
    match db.enqueue(video_id, &JobPayload::default()).await? {
        EnqueueOutcome::Queued(job_id) => println!("Queued job {job_id} for video {video_id}"),
        EnqueueOutcome::AlreadyActive => println!("Video {video_id} already has an active job"),
        EnqueueOutcome::NotFound => bail!("video {video_id} not found"),
        EnqueueOutcome::Gone => bail!("video {video_id} was deleted"),
        EnqueueOutcome::Ineligible(status) => {
            bail!("video {video_id} is {} and cannot be enqueued", status.as_str())
        }
    }
    Ok(())
}
