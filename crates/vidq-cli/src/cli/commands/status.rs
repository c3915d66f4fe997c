//! `vidq status` – show videos and download jobs.

use anyhow::Result;
use vidq_core::queue_db::QueueDb;

const ERROR_WIDTH: usize = 60;

fn short(s: &str) -> String {
    match s.char_indices().nth(ERROR_WIDTH) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}

pub async fn run_status(db: &QueueDb) -> Result<()> {
    let videos = db.list_videos(None).await?;
    if videos.is_empty() {
        println!("No videos in database.");
        return Ok(());
    }
    println!("{:<6} {:<12} {:<8} {:<20} {}", "ID", "STATUS", "TRIES", "EXTERNAL_ID", "OBJECT / LAST ERROR");
    for v in &videos {
        let detail = v
            .object_key
            .clone()
            .or_else(|| v.last_error.as_deref().map(short))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<12} {:<8} {:<20} {}",
            v.id,
            v.status.as_str(),
            v.attempts,
            v.external_id,
            detail
        );
    }

    let jobs = db.list_jobs(None).await?;
    if jobs.is_empty() {
        return Ok(());
    }
    println!();
    println!("{:<6} {:<6} {:<10} {:<20} {}", "JOB", "VIDEO", "STATUS", "WORKER", "LAST ERROR");
    for j in &jobs {
        println!(
            "{:<6} {:<6} {:<10} {:<20} {}",
            j.id,
            j.video_id,
            j.status.as_str(),
            j.worker_id.as_deref().unwrap_or("-"),
            j.last_error.as_deref().map(short).unwrap_or_else(|| "-".to_string())
        );
    }
    let active = jobs.iter().filter(|j| j.status.is_active()).count();
    println!("\n{} job(s), {} active", jobs.len(), active);
    Ok(())
}
