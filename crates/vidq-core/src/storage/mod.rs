//! Durable object storage for downloaded videos.
//!
//! `ObjectStore` is the capability the pipeline needs (put one object, get
//! an etag back). `Uploader` wraps a store with what every upload does:
//! checksum, mime sniffing and key derivation.

mod key;
mod local;
pub mod mime;
mod remote;

pub use key::{object_key, sanitize_segment, KEY_PREFIX};
pub use local::LocalObjectStore;
pub use remote::HttpObjectStore;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::checksum::digest_file;
use crate::error::{JobError, Stage};
use crate::queue_db::{unix_millis, JobId, UploadRecord};

/// One object to store: a local file plus what is known about it.
#[derive(Debug, Clone, Copy)]
pub struct PutObject<'a> {
    pub key: &'a str,
    pub path: &'a Path,
    pub content_type: &'a str,
    pub len: u64,
    /// Lowercase hex SHA-256 of the file.
    pub sha256: &'a str,
}

/// What the store reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub etag: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Provider name recorded on the video (`local`, `http`).
    fn provider(&self) -> &str;

    fn bucket(&self) -> &str;

    /// Store `obj` under its key. Rejections are `StorageFailed`.
    async fn put_object(&self, obj: PutObject<'_>, cancel: &CancellationToken) -> Result<StoredObject, JobError>;
}

/// Checksum, sniff, name and store a fetched file.
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Uploader { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload `path` for `external_id`. `content_type_hint` is the server's
    /// `Content-Type`, used only when the bytes do not identify the container.
    pub async fn upload(
        &self,
        path: &Path,
        external_id: &str,
        job_id: JobId,
        content_type_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<UploadRecord, JobError> {
        let p = path.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || digest_file(&p))
            .await
            .map_err(|e| JobError::Aborted(format!("checksum task failed: {e}")))??;

        let mime_type = mime::resolve_mime(&digest.head, content_type_hint);
        let key = object_key(external_id, job_id, unix_millis(), mime::extension_for(&mime_type));
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled(Stage::Upload));
        }

        let obj = PutObject {
            key: &key,
            path,
            content_type: &mime_type,
            len: digest.len,
            sha256: &digest.sha256,
        };
        let stored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled(Stage::Upload)),
            res = self.store.put_object(obj, cancel) => res?,
        };

        tracing::debug!(key = %key, bytes = digest.len, mime = %mime_type, "object stored");
        Ok(UploadRecord {
            provider: self.store.provider().to_string(),
            bucket: self.store.bucket().to_string(),
            object_key: key,
            etag: stored.etag,
            filesize: i64::try_from(digest.len).unwrap_or(i64::MAX),
            mime_type,
            checksum: digest.sha256,
        })
    }
}
