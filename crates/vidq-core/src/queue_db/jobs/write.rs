//! Job write operations: enqueue, retry, terminal transitions.

use anyhow::Result;
use sqlx::{Row, SqliteConnection};

use super::super::db::{truncate_diagnostic, unix_millis, QueueDb};
use super::super::types::{
    EnqueueOutcome, JobId, JobPayload, RetryOutcome, StorageMetadata, UploadRecord, VideoId,
    VideoStatus,
};
use super::payload_json;

/// Status, soft-delete marker and attempts of one video, read inside a transaction.
struct VideoGate {
    status: VideoStatus,
    deleted: bool,
    attempts: i64,
}

async fn load_gate(conn: &mut SqliteConnection, video_id: VideoId) -> Result<Option<VideoGate>> {
    let row = sqlx::query(
        "SELECT status, marked_for_deletion, attempts FROM videos WHERE id = ?1",
    )
    .bind(video_id)
    .fetch_optional(conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let status = VideoStatus::from_str(&row.try_get::<String, _>("status")?);
    let marked: bool = row.try_get("marked_for_deletion")?;
    Ok(Some(VideoGate {
        status,
        deleted: marked || status == VideoStatus::Deleted,
        attempts: row.try_get("attempts")?,
    }))
}

/// Insert a pending job unless the video already has an active one.
async fn insert_pending(
    conn: &mut SqliteConnection,
    video_id: VideoId,
    payload: &JobPayload,
    now: i64,
) -> Result<Option<JobId>> {
    let row = sqlx::query(
        r#"
        INSERT INTO download_jobs (video_id, status, scheduled_at, payload, updated_at)
        VALUES (?1, 'pending', ?2, ?3, ?2)
        ON CONFLICT DO NOTHING
        RETURNING id
        "#,
    )
    .bind(video_id)
    .bind(now)
    .bind(payload_json(payload)?)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(|r| r.try_get::<i64, _>("id")).transpose()?)
}

impl QueueDb {
    /// Create a pending job for a video in `new` or `queued` status.
    ///
    /// A video that already has a pending or running job is left alone
    /// (`AlreadyActive`); the partial unique index makes that check race-free.
    pub async fn enqueue(&self, video_id: VideoId, payload: &JobPayload) -> Result<EnqueueOutcome> {
        let now = unix_millis();
        let mut tx = self.begin_immediate().await?;

        let gate = load_gate(tx.conn(), video_id).await?;
        let outcome = match gate {
            None => EnqueueOutcome::NotFound,
            Some(gate) if gate.deleted => EnqueueOutcome::Gone,
            Some(gate) if !gate.status.is_enqueueable() => EnqueueOutcome::Ineligible(gate.status),
            Some(_) => match insert_pending(tx.conn(), video_id, payload, now).await? {
                None => EnqueueOutcome::AlreadyActive,
                Some(job_id) => {
                    sqlx::query(
                        "UPDATE videos SET status = 'queued', updated_at = ?2 WHERE id = ?1",
                    )
                    .bind(video_id)
                    .bind(now)
                    .execute(tx.conn())
                    .await?;
                    EnqueueOutcome::Queued(job_id)
                }
            },
        };

        match outcome {
            EnqueueOutcome::Queued(_) => tx.commit().await?,
            _ => tx.rollback().await?,
        }
        Ok(outcome)
    }

    /// Append a fresh job for a `failed` video whose attempts are below `max_attempts`.
    ///
    /// The failed job row stays as history. The video returns to `queued`
    /// with its `last_error` cleared; `attempts` keeps counting.
    pub async fn schedule_retry(&self, video_id: VideoId, max_attempts: i64) -> Result<RetryOutcome> {
        let now = unix_millis();
        let payload = JobPayload {
            retry: true,
            note: None,
        };
        let mut tx = self.begin_immediate().await?;

        let gate = load_gate(tx.conn(), video_id).await?;
        let outcome = match gate {
            None => RetryOutcome::NotFound,
            Some(gate) if gate.deleted => RetryOutcome::Gone,
            Some(gate) if gate.status != VideoStatus::Failed => RetryOutcome::NotFailed(gate.status),
            Some(gate) if gate.attempts >= max_attempts => {
                RetryOutcome::AttemptsExhausted(gate.attempts)
            }
            Some(_) => match insert_pending(tx.conn(), video_id, &payload, now).await? {
                None => RetryOutcome::AlreadyActive,
                Some(job_id) => {
                    sqlx::query(
                        r#"
                        UPDATE videos
                        SET status = 'queued',
                            last_error = NULL,
                            updated_at = ?2
                        WHERE id = ?1
                        "#,
                    )
                    .bind(video_id)
                    .bind(now)
                    .execute(tx.conn())
                    .await?;
                    RetryOutcome::Scheduled(job_id)
                }
            },
        };

        match outcome {
            RetryOutcome::Scheduled(_) => tx.commit().await?,
            _ => tx.rollback().await?,
        }
        Ok(outcome)
    }

    /// Record a successful execution: job `completed`, video `uploaded` with
    /// its storage reference, in one transaction.
    ///
    /// Returns false (and writes nothing) when `worker_id` no longer owns the
    /// running job, e.g. after an operator ran recovery underneath it. A video
    /// soft-deleted mid-flight keeps its `deleted` status and gets no
    /// storage reference.
    pub async fn finish_job_success(
        &self,
        job_id: JobId,
        worker_id: &str,
        record: &UploadRecord,
        metadata: &StorageMetadata,
    ) -> Result<bool> {
        let now = unix_millis();
        let metadata_json = serde_json::to_string(metadata)?;
        let mut tx = self.begin_immediate().await?;

        let Some(video_id) = close_job(tx.conn(), job_id, worker_id, "completed", None, now).await?
        else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE videos
            SET status = 'uploaded',
                storage_provider = ?2,
                bucket = ?3,
                object_key = ?4,
                storage_etag = ?5,
                filesize = ?6,
                mime_type = ?7,
                downloaded_at = ?8,
                storage_metadata = ?9,
                last_error = NULL,
                updated_at = ?8
            WHERE id = ?1
              AND status != 'deleted'
              AND marked_for_deletion = 0
            "#,
        )
        .bind(video_id)
        .bind(&record.provider)
        .bind(&record.bucket)
        .bind(&record.object_key)
        .bind(&record.etag)
        .bind(record.filesize)
        .bind(&record.mime_type)
        .bind(now)
        .bind(metadata_json)
        .execute(tx.conn())
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Record a failed execution: job `failed`, video `failed` with
    /// `attempts + 1`, in one transaction. Soft-deleted videos stay `deleted`.
    ///
    /// Returns false when `worker_id` no longer owns the running job.
    pub async fn finish_job_failure(&self, job_id: JobId, worker_id: &str, error: &str) -> Result<bool> {
        let now = unix_millis();
        let error = truncate_diagnostic(error);
        let mut tx = self.begin_immediate().await?;

        let Some(video_id) =
            close_job(tx.conn(), job_id, worker_id, "failed", Some(&error), now).await?
        else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE videos
            SET status = CASE
                    WHEN status = 'deleted' OR marked_for_deletion = 1 THEN 'deleted'
                    ELSE 'failed'
                END,
                attempts = attempts + 1,
                last_error = ?2,
                last_attempt_at = ?3,
                storage_provider = NULL,
                bucket = NULL,
                object_key = NULL,
                storage_etag = NULL,
                filesize = NULL,
                mime_type = NULL,
                downloaded_at = NULL,
                storage_metadata = NULL,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(video_id)
        .bind(&error)
        .bind(now)
        .execute(tx.conn())
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

/// Move a running job owned by `worker_id` into a terminal status.
/// Returns its video id, or None when the job is not ours to close.
async fn close_job(
    conn: &mut SqliteConnection,
    job_id: JobId,
    worker_id: &str,
    status: &str,
    error: Option<&str>,
    now: i64,
) -> Result<Option<VideoId>> {
    let row = sqlx::query(
        r#"
        UPDATE download_jobs
        SET status = ?3,
            last_error = ?4,
            finished_at = ?5,
            updated_at = ?5
        WHERE id = ?1 AND worker_id = ?2 AND status = 'running'
        RETURNING video_id
        "#,
    )
    .bind(job_id)
    .bind(worker_id)
    .bind(status)
    .bind(error)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(|r| r.try_get::<i64, _>("video_id")).transpose()?)
}
