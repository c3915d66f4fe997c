//! One job execution: load → resolve → fetch → upload, then record the outcome.
//!
//! Every stage failure becomes a `JobError` and is written as the job's
//! failure transition; nothing propagates to the worker loop. The stages run
//! in their own task so a panic is caught and recorded as `Aborted`.

use anyhow::Result;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::VidqConfig;
use crate::downloader::{CurlFetcher, FetchRequest, MediaFetcher, TempFile};
use crate::error::{JobError, Stage};
use crate::queue_db::{DownloadJob, JobId, QueueDb, StorageMetadata, UploadRecord, VideoId};
use crate::resolver::{Extractor, ResolveTarget, ResolvedMedia};
use crate::storage::Uploader;

use super::guard::AbortOnDrop;

/// How a job execution ended.
#[derive(Debug)]
pub enum JobOutcome {
    /// Job `completed`, video `uploaded`.
    Completed(UploadRecord),
    /// Job and video `failed` with this error.
    Failed(JobError),
    /// The terminal transition could not be written (ownership lost or store
    /// error). The job stays `running` until recovery resets it.
    Unrecorded(String),
}

#[derive(Debug)]
pub struct JobReport {
    pub job_id: JobId,
    pub video_id: VideoId,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, JobOutcome::Completed(_))
    }
}

/// Everything a job execution needs, shared by all in-flight jobs.
pub struct Pipeline {
    db: QueueDb,
    worker_id: String,
    extractor: Extractor,
    fetcher: Arc<dyn MediaFetcher>,
    uploader: Uploader,
    temp_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        db: QueueDb,
        worker_id: impl Into<String>,
        extractor: Extractor,
        fetcher: Arc<dyn MediaFetcher>,
        uploader: Uploader,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Pipeline {
            db,
            worker_id: worker_id.into(),
            extractor,
            fetcher,
            uploader,
            temp_dir: temp_dir.into(),
        }
    }

    /// Pipeline with the built-in extractor chain, libcurl fetcher and the
    /// configured object store.
    pub fn from_config(db: QueueDb, cfg: &VidqConfig) -> Result<Self> {
        Ok(Pipeline::new(
            db,
            cfg.effective_worker_id(),
            Extractor::with_defaults(&cfg.extractor_settings()),
            Arc::new(CurlFetcher::new(cfg.fetch_settings())),
            Uploader::new(cfg.build_store()?),
            cfg.effective_temp_dir(),
        ))
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn db(&self) -> &QueueDb {
        &self.db
    }

    /// Run a claimed job to its terminal state.
    ///
    /// `cancel` is the job's own token; once it fires, the current stage
    /// stops and the job is recorded as `Cancelled`.
    pub async fn execute(self: Arc<Self>, job: DownloadJob, cancel: CancellationToken) -> JobReport {
        let span = tracing::info_span!("job", job_id = job.id, video_id = job.video_id);
        let started = Instant::now();

        let stages = tokio::spawn({
            let this = Arc::clone(&self);
            let job = job.clone();
            async move { this.run_stages(&job, &cancel).await }.instrument(span.clone())
        });
        let _abort = AbortOnDrop(stages.abort_handle());

        let result = match stages.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                Err(JobError::Aborted(format!("stage panicked: {}", panic_message(&*payload))))
            }
            Err(e) => Err(JobError::Aborted(format!("stage task failed: {e}"))),
        };

        let outcome = self.record(&job, result).instrument(span).await;
        JobReport {
            job_id: job.id,
            video_id: job.video_id,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    async fn run_stages(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
    ) -> Result<(UploadRecord, StorageMetadata), JobError> {
        let video = self
            .db
            .get_video(job.video_id)
            .await?
            .ok_or(JobError::NotFound(job.video_id))?;
        if video.is_deleted() {
            return Err(JobError::Gone(video.id));
        }
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled(Stage::Load));
        }
        // Guarded on the soft-delete markers, so a delete racing the load still wins.
        if !self.db.mark_video_downloading(video.id).await? {
            return Err(JobError::Gone(video.id));
        }

        let media = match video.cached_direct() {
            Some((url, meta)) => {
                tracing::debug!(url = %url, "reusing cached direct url");
                ResolvedMedia { url, meta }
            }
            None => {
                let media = self.extractor.resolve(&ResolveTarget::from(&video), cancel).await?;
                self.db.save_direct_url(video.id, &media.url, &media.meta).await?;
                media
            }
        };

        tokio::fs::create_dir_all(&self.temp_dir).await.map_err(|e| {
            JobError::Aborted(format!("create temp dir {}: {e}", self.temp_dir.display()))
        })?;
        let temp = TempFile::new_in(&self.temp_dir, job.id);
        let request = FetchRequest {
            url: media.url.clone(),
            headers: media.meta.headers.clone(),
            dest: temp.path().to_path_buf(),
        };
        let fetched = self.fetcher.fetch(&request, cancel).await?;
        tracing::info!(bytes = fetched.bytes, stage = %Stage::Fetch, "media fetched");

        let hint = fetched
            .content_type
            .as_deref()
            .or(media.meta.content_type.as_deref());
        let record = self
            .uploader
            .upload(temp.path(), &video.external_id, job.id, hint, cancel)
            .await?;
        drop(temp);

        let metadata = StorageMetadata {
            original_url: media.url,
            worker_id: self.worker_id.clone(),
            sha256: record.checksum.clone(),
            job_id: job.id,
        };
        Ok((record, metadata))
    }

    async fn record(
        &self,
        job: &DownloadJob,
        result: Result<(UploadRecord, StorageMetadata), JobError>,
    ) -> JobOutcome {
        match result {
            Ok((record, metadata)) => {
                match self
                    .db
                    .finish_job_success(job.id, &self.worker_id, &record, &metadata)
                    .await
                {
                    Ok(true) => {
                        tracing::info!(
                            worker_id = %self.worker_id,
                            key = %record.object_key,
                            bytes = record.filesize,
                            "job completed"
                        );
                        JobOutcome::Completed(record)
                    }
                    Ok(false) => self.unrecorded("job no longer owned by this worker".to_string()),
                    Err(e) => self.unrecorded(format!("record success: {e:#}")),
                }
            }
            Err(err) => {
                tracing::warn!(worker_id = %self.worker_id, kind = err.kind(), error = %err, "job failed");
                match self
                    .db
                    .finish_job_failure(job.id, &self.worker_id, &err.diagnostic())
                    .await
                {
                    Ok(true) => JobOutcome::Failed(err),
                    Ok(false) => self.unrecorded("job no longer owned by this worker".to_string()),
                    Err(e) => self.unrecorded(format!("record failure ({err}): {e:#}")),
                }
            }
        }
    }

    fn unrecorded(&self, reason: String) -> JobOutcome {
        tracing::error!(worker_id = %self.worker_id, reason = %reason, "job outcome not recorded");
        JobOutcome::Unrecorded(reason)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
