//! Types used by the queue database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Download job identifier.
pub type JobId = i64;

/// Internal video identifier (row id, distinct from the platform's external id).
pub type VideoId = i64;

/// Download job status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            _ => JobStatus::Failed,
        }
    }

    /// Pending and running jobs count against the one-active-job-per-video limit.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// Video lifecycle status. `Deleted` is the soft-delete terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStatus {
    New,
    Queued,
    Downloading,
    Uploaded,
    Failed,
    Deleted,
}

impl VideoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoStatus::New => "new",
            VideoStatus::Queued => "queued",
            VideoStatus::Downloading => "downloading",
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Failed => "failed",
            VideoStatus::Deleted => "deleted",
        }
    }

    /// Older rows written by the scraper use `pending` for queued videos.
    pub fn from_str(s: &str) -> Self {
        match s {
            "new" => VideoStatus::New,
            "queued" | "pending" => VideoStatus::Queued,
            "downloading" => VideoStatus::Downloading,
            "uploaded" => VideoStatus::Uploaded,
            "deleted" => VideoStatus::Deleted,
            _ => VideoStatus::Failed,
        }
    }

    /// Statuses from which a download job may be enqueued.
    pub fn is_enqueueable(self) -> bool {
        matches!(self, VideoStatus::New | VideoStatus::Queued)
    }
}

/// Transfer metadata captured alongside a resolved direct media URL.
///
/// Stored as JSON in `videos.video_url_meta`. Anything beyond the fixed
/// fields goes into `headers` (request headers to replay on fetch) or `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Size hint in bytes as advertised by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Which resolution strategy produced the URL (e.g. `page_scrape`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Optional hint attached to a job row, stored as JSON in `download_jobs.payload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Set when the job was created by an explicit retry of a failed video.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Full download job row.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    pub video_id: VideoId,
    pub status: JobStatus,
    /// Worker identity that claimed the job; cleared again by recovery.
    pub worker_id: Option<String>,
    pub scheduled_at: i64,
    /// Claim timestamp.
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub last_error: Option<String>,
    pub payload: JobPayload,
}

/// Full video row.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: VideoId,
    pub external_id: String,
    pub title: Option<String>,
    /// Canonical page URL on the platform.
    pub video_url: String,
    pub video_url_direct: Option<String>,
    pub video_url_meta: Option<MediaMeta>,
    pub viral_score: Option<f64>,
    pub momentum: Option<f64>,
    pub is_surge: bool,
    pub surge_factor: Option<f64>,
    pub status: VideoStatus,
    pub marked_for_deletion: bool,
    pub storage_provider: Option<String>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub storage_etag: Option<String>,
    pub filesize: Option<i64>,
    pub mime_type: Option<String>,
    pub downloaded_at: Option<i64>,
    pub storage_metadata: Option<StorageMetadata>,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Video {
    /// True when the video has been soft-deleted by either marker.
    pub fn is_deleted(&self) -> bool {
        self.marked_for_deletion || self.status == VideoStatus::Deleted
    }

    /// Cached direct URL and its metadata, when a previous attempt resolved one.
    pub fn cached_direct(&self) -> Option<(String, MediaMeta)> {
        self.video_url_direct
            .as_ref()
            .filter(|u| !u.is_empty())
            .map(|u| (u.clone(), self.video_url_meta.clone().unwrap_or_default()))
    }
}

/// Fields the scraper supplies when it discovers a video.
#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub external_id: String,
    pub title: Option<String>,
    pub video_url: String,
    pub video_url_direct: Option<String>,
    pub video_url_meta: Option<MediaMeta>,
    pub viral_score: Option<f64>,
    pub momentum: Option<f64>,
    pub is_surge: bool,
    pub surge_factor: Option<f64>,
}

/// Storage reference and file facts written when a job succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub provider: String,
    pub bucket: String,
    pub object_key: String,
    pub etag: Option<String>,
    pub filesize: i64,
    pub mime_type: String,
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub checksum: String,
}

/// Provenance stored as JSON in `videos.storage_metadata` after an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetadata {
    /// Direct media URL the bytes were fetched from.
    pub original_url: String,
    pub worker_id: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub job_id: JobId,
}

/// Result of the enqueue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new pending job was created.
    Queued(JobId),
    /// The video already has a pending or running job; nothing was inserted.
    AlreadyActive,
    NotFound,
    /// The video is soft-deleted.
    Gone,
    /// The video's status does not allow enqueueing (e.g. already uploaded).
    Ineligible(VideoStatus),
}

/// Result of scheduling a retry for a failed video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Scheduled(JobId),
    AlreadyActive,
    NotFound,
    Gone,
    NotFailed(VideoStatus),
    /// The video has used up the caller's attempt budget.
    AttemptsExhausted(i64),
}
