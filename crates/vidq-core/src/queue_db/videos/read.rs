use anyhow::Result;

use super::super::db::QueueDb;
use super::super::types::{Video, VideoId, VideoStatus};
use super::{video_from_row, VIDEO_COLUMNS};

impl QueueDb {
    pub async fn get_video(&self, id: VideoId) -> Result<Option<Video>> {
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    pub async fn get_video_by_external_id(&self, external_id: &str) -> Result<Option<Video>> {
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE external_id = ?1");
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    /// List videos, newest first, optionally filtered by status.
    pub async fn list_videos(&self, status: Option<VideoStatus>) -> Result<Vec<Video>> {
        let sql = format!(
            r#"
            SELECT {VIDEO_COLUMNS} FROM videos
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(VideoStatus::as_str))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(video_from_row).collect()
    }
}
