//! Video record operations.

mod read;
mod write;

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::types::{MediaMeta, StorageMetadata, Video, VideoStatus};

pub(crate) const VIDEO_COLUMNS: &str = "id, external_id, title, video_url, video_url_direct, \
     video_url_meta, viral_score, momentum, is_surge, surge_factor, status, \
     marked_for_deletion, storage_provider, bucket, object_key, storage_etag, filesize, \
     mime_type, downloaded_at, storage_metadata, attempts, last_error, last_attempt_at, \
     created_at, updated_at";

fn parse_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.as_deref()
        .filter(|s| !s.is_empty())
        .map(serde_json::from_str::<T>)
        .transpose()
        .map_err(Into::into)
}

pub(crate) fn video_from_row(row: &SqliteRow) -> Result<Video> {
    let status: String = row.try_get("status")?;
    let meta: Option<MediaMeta> = parse_json(row.try_get("video_url_meta")?)?;
    let storage_metadata: Option<StorageMetadata> = parse_json(row.try_get("storage_metadata")?)?;

    Ok(Video {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        title: row.try_get("title")?,
        video_url: row.try_get("video_url")?,
        video_url_direct: row.try_get("video_url_direct")?,
        video_url_meta: meta,
        viral_score: row.try_get("viral_score")?,
        momentum: row.try_get("momentum")?,
        is_surge: row.try_get("is_surge")?,
        surge_factor: row.try_get("surge_factor")?,
        status: VideoStatus::from_str(&status),
        marked_for_deletion: row.try_get("marked_for_deletion")?,
        storage_provider: row.try_get("storage_provider")?,
        bucket: row.try_get("bucket")?,
        object_key: row.try_get("object_key")?,
        storage_etag: row.try_get("storage_etag")?,
        filesize: row.try_get("filesize")?,
        mime_type: row.try_get("mime_type")?,
        downloaded_at: row.try_get("downloaded_at")?,
        storage_metadata,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
