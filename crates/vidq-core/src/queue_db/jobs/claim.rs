//! Claim protocol and crash recovery.

use anyhow::Result;

use super::super::db::{unix_millis, QueueDb};
use super::super::types::{DownloadJob, JobId};
use super::{job_from_row, JOB_COLUMNS};

impl QueueDb {
    /// Atomically claim the oldest pending job for `worker_id`.
    ///
    /// Selection and the `pending -> running` transition are one UPDATE
    /// statement executed under the database write lock, so concurrent
    /// callers (in this process or others sharing the file) never receive
    /// the same job. Order is `scheduled_at`, then id. `None` means the
    /// backlog is empty.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<DownloadJob>> {
        let now = unix_millis();
        let sql = format!(
            r#"
            UPDATE download_jobs
            SET status = 'running',
                worker_id = ?1,
                started_at = ?2,
                updated_at = ?2
            WHERE id = (
                SELECT id FROM download_jobs
                WHERE status = 'pending'
                ORDER BY scheduled_at ASC, id ASC
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        );

        let mut tx = self.begin_immediate().await?;
        let row = sqlx::query(&sql)
            .bind(worker_id)
            .bind(now)
            .fetch_optional(tx.conn())
            .await?;
        let job = row.as_ref().map(job_from_row).transpose()?;
        tx.commit().await?;
        Ok(job)
    }

    /// Reset this worker's stranded `running` jobs back to `pending`.
    ///
    /// Runs at worker startup, before the first claim. Only rows owned by
    /// `worker_id` are touched; the videos of those jobs go from
    /// `downloading` back to `queued`. Returns the number of jobs reset, so
    /// a second call right after the first returns 0.
    pub async fn recover_worker_jobs(&self, worker_id: &str) -> Result<u64> {
        let now = unix_millis();
        let mut tx = self.begin_immediate().await?;

        sqlx::query(
            r#"
            UPDATE videos
            SET status = 'queued',
                updated_at = ?2
            WHERE status = 'downloading'
              AND id IN (
                SELECT video_id FROM download_jobs
                WHERE worker_id = ?1 AND status = 'running'
              )
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .execute(tx.conn())
        .await?;

        let reset = sqlx::query(
            r#"
            UPDATE download_jobs
            SET status = 'pending',
                worker_id = NULL,
                started_at = NULL,
                updated_at = ?2
            WHERE worker_id = ?1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .execute(tx.conn())
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(reset)
    }

    /// Hand a job this worker claimed but never started back to the queue.
    ///
    /// Guarded on ownership like the terminal transitions; false when the
    /// job is no longer `running` under `worker_id`.
    pub async fn release_job(&self, job_id: JobId, worker_id: &str) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE download_jobs
            SET status = 'pending',
                worker_id = NULL,
                started_at = NULL,
                updated_at = ?3
            WHERE id = ?1 AND worker_id = ?2 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(unix_millis())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}
