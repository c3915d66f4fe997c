//! Filesystem object store: `<root>/<bucket>/<key>`.
//!
//! Objects are copied to `<key>.part` first and renamed into place, so a
//! reader never sees a half-written object.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::{ObjectStore, PutObject, StoredObject};
use crate::downloader::remove_quietly;
use crate::error::JobError;

/// Temporary file suffix used before atomic rename.
const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path.
fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Removes the `.part` file unless the rename happened.
struct PartGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartGuard {
    fn drop(&mut self) {
        if self.armed {
            remove_quietly(&self.path);
        }
    }
}

pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        LocalObjectStore {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    /// Where `key` lives on disk. Keys are produced by `object_key`, which
    /// never yields `..` segments.
    pub fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(&self.bucket).join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn provider(&self) -> &str {
        "local"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, obj: PutObject<'_>, _cancel: &CancellationToken) -> Result<StoredObject, JobError> {
        let storage_failed = |what: &str, e: std::io::Error| JobError::StorageFailed(format!("{what}: {e}"));

        if obj.key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(JobError::StorageFailed(format!("invalid object key {:?}", obj.key)));
        }
        let final_path = self.object_path(obj.key);
        if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            return Err(JobError::StorageFailed(format!("object {} already exists", obj.key)));
        }
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_failed("create bucket dir", e))?;
        }

        let mut part = PartGuard {
            path: temp_path(&final_path),
            armed: true,
        };
        let copied = tokio::fs::copy(obj.path, &part.path)
            .await
            .map_err(|e| storage_failed("copy object", e))?;
        if copied != obj.len {
            return Err(JobError::StorageFailed(format!(
                "short copy: {copied} of {} bytes",
                obj.len
            )));
        }
        tokio::fs::rename(&part.path, &final_path)
            .await
            .map_err(|e| storage_failed("finalize object", e))?;
        part.armed = false;

        Ok(StoredObject {
            etag: Some(obj.sha256.to_string()),
        })
    }
}
