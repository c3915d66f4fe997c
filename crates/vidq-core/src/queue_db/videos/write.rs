//! Video write operations: insert, status transitions owned by the pipeline, soft delete.

use anyhow::{Context, Result};

use super::super::db::{unix_millis, QueueDb};
use super::super::types::{MediaMeta, NewVideo, VideoId};

impl QueueDb {
    /// Insert a discovered video with status `new`. Fails if the external id exists.
    pub async fn insert_video(&self, video: &NewVideo) -> Result<VideoId> {
        let now = unix_millis();
        let meta_json = video
            .video_url_meta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let id = sqlx::query(
            r#"
            INSERT INTO videos (
                external_id, title, video_url, video_url_direct, video_url_meta,
                viral_score, momentum, is_surge, surge_factor,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'new', ?10, ?10)
            "#,
        )
        .bind(&video.external_id)
        .bind(&video.title)
        .bind(&video.video_url)
        .bind(&video.video_url_direct)
        .bind(meta_json)
        .bind(video.viral_score)
        .bind(video.momentum)
        .bind(video.is_surge)
        .bind(video.surge_factor)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert video {}", video.external_id))?
        .last_insert_rowid();

        Ok(id)
    }

    /// Move a video to `downloading`, unless it is soft-deleted.
    ///
    /// The guard is part of the UPDATE, so a delete racing the pipeline wins.
    /// Returns false when nothing was updated.
    pub async fn mark_video_downloading(&self, id: VideoId) -> Result<bool> {
        let now = unix_millis();
        let n = sqlx::query(
            r#"
            UPDATE videos
            SET status = 'downloading',
                storage_provider = NULL,
                bucket = NULL,
                object_key = NULL,
                storage_etag = NULL,
                filesize = NULL,
                mime_type = NULL,
                downloaded_at = NULL,
                storage_metadata = NULL,
                updated_at = ?2
            WHERE id = ?1
              AND status != 'deleted'
              AND marked_for_deletion = 0
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(n > 0)
    }

    /// Cache a resolved direct media URL on the video so later attempts skip extraction.
    pub async fn save_direct_url(&self, id: VideoId, url: &str, meta: &MediaMeta) -> Result<()> {
        let now = unix_millis();
        let meta_json = serde_json::to_string(meta)?;
        sqlx::query(
            r#"
            UPDATE videos
            SET video_url_direct = ?2,
                video_url_meta = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(url)
        .bind(meta_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Soft-delete a video. Its storage reference is dropped along with the
    /// `uploaded` status; pending jobs for it fail with `Gone` when claimed.
    /// Returns false if the video does not exist.
    pub async fn mark_deleted(&self, id: VideoId) -> Result<bool> {
        let now = unix_millis();
        let n = sqlx::query(
            r#"
            UPDATE videos
            SET status = 'deleted',
                marked_for_deletion = 1,
                storage_provider = NULL,
                bucket = NULL,
                object_key = NULL,
                storage_etag = NULL,
                filesize = NULL,
                mime_type = NULL,
                downloaded_at = NULL,
                storage_metadata = NULL,
                updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(n > 0)
    }
}
