//! Download job operations: claim, enqueue, finalize, recover, read.

mod claim;
mod read;
mod write;

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::types::{DownloadJob, JobPayload, JobStatus};

/// Column list shared by every query that materializes a `DownloadJob`.
pub(crate) const JOB_COLUMNS: &str = "id, video_id, status, worker_id, scheduled_at, \
     started_at, finished_at, last_error, payload";

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<DownloadJob> {
    let status: String = row.try_get("status")?;
    let payload: Option<String> = row.try_get("payload")?;
    let payload = payload
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(serde_json::from_str::<JobPayload>)
        .transpose()?
        .unwrap_or_default();

    Ok(DownloadJob {
        id: row.try_get("id")?,
        video_id: row.try_get("video_id")?,
        status: JobStatus::from_str(&status),
        worker_id: row.try_get("worker_id")?,
        scheduled_at: row.try_get("scheduled_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        last_error: row.try_get("last_error")?,
        payload,
    })
}

/// Payload column value: NULL for the default payload, JSON otherwise.
pub(crate) fn payload_json(payload: &JobPayload) -> Result<Option<String>> {
    if payload == &JobPayload::default() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(payload)?))
}
