//! Media fetcher: streams a direct media URL into a local temp file.
//!
//! `MediaFetcher` is the seam the pipeline depends on; `CurlFetcher` is the
//! libcurl implementation. Transfers run on the blocking pool and observe the
//! job's cancellation token through curl's progress callback.

mod single;
mod temp;

pub use single::download_single;
pub use temp::TempFile;

pub(crate) use temp::remove_quietly;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, Stage};
use crate::http::HttpSettings;

/// One transfer: where from, with which headers, into which file.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Request headers to replay (captured alongside the URL).
    pub headers: BTreeMap<String, String>,
    pub dest: PathBuf,
}

/// What landed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub bytes: u64,
    /// `Content-Type` the server sent, if any.
    pub content_type: Option<String>,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Stream `req.url` into `req.dest`.
    ///
    /// On any error the destination file must not be left behind.
    async fn fetch(&self, req: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedFile, JobError>;
}

/// Transfer limits for `CurlFetcher`.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub http: HttpSettings,
    /// Whole-transfer timeout.
    pub transfer_timeout: Duration,
    /// Bodies smaller than this are rejected as error pages or stubs.
    pub min_file_size: u64,
}

pub struct CurlFetcher {
    settings: FetchSettings,
}

impl CurlFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        CurlFetcher { settings }
    }
}

#[async_trait]
impl MediaFetcher for CurlFetcher {
    async fn fetch(&self, req: &FetchRequest, cancel: &CancellationToken) -> Result<FetchedFile, JobError> {
        let req = req.clone();
        let settings = self.settings.clone();
        let token = cancel.clone();
        let dest = req.dest.clone();

        let result = tokio::task::spawn_blocking(move || download_single(&req, &settings, &token))
            .await
            .unwrap_or_else(|e| Err(JobError::Aborted(format!("fetch task failed: {e}"))));

        if result.is_err() {
            remove_quietly(&dest);
        }
        match result {
            Err(_) if cancel.is_cancelled() => Err(JobError::Cancelled(Stage::Fetch)),
            other => other,
        }
    }
}
