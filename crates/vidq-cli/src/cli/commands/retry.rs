//! `vidq retry <video_id>` – new job for a failed video.

use anyhow::{bail, Result};
use vidq_core::queue_db::{QueueDb, RetryOutcome};

pub async fn run_retry(db: &QueueDb, video_id: i64, max_attempts: i64) -> Result<()> {
    match db.schedule_retry(video_id, max_attempts).await? {
        RetryOutcome::Scheduled(job_id) => println!("Scheduled retry job {job_id} for video {video_id}"),
        RetryOutcome::AlreadyActive => println!("Video {video_id} already has an active job"),
        RetryOutcome::NotFound => bail!("video {video_id} not found"),
        RetryOutcome::Gone => bail!("video {video_id} was deleted"),
        RetryOutcome::NotFailed(status) => {
            bail!("video {video_id} is {}, only failed videos can be retried", status.as_str())
        }
        RetryOutcome::AttemptsExhausted(attempts) => {
            bail!("video {video_id} already failed {attempts} time(s) (limit {max_attempts})")
        }
    }
    Ok(())
}
