//! `vidq delete <video_id>` – soft-delete a video.

use anyhow::{bail, Result};
use vidq_core::queue_db::QueueDb;

pub async fn run_delete(db: &QueueDb, video_id: i64) -> Result<()> {
    if !db.mark_deleted(video_id).await? {
        bail!("video {video_id} not found");
    }
    println!("Deleted video {video_id}");
    Ok(())
}
