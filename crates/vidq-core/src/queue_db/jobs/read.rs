//! Job read operations: get and list.

use anyhow::Result;

use super::super::db::QueueDb;
use super::super::types::{DownloadJob, JobId, JobStatus, VideoId};
use super::{job_from_row, JOB_COLUMNS};

impl QueueDb {
    /// Fetch a single job row.
    pub async fn get_job(&self, id: JobId) -> Result<Option<DownloadJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM download_jobs WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// List jobs, newest first, optionally filtered by status.
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<DownloadJob>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS} FROM download_jobs
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(JobStatus::as_str))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Job history of one video, oldest first.
    pub async fn jobs_for_video(&self, video_id: VideoId) -> Result<Vec<DownloadJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM download_jobs WHERE video_id = ?1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(video_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }
}
