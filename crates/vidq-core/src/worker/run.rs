//! Worker loop: recover, then claim and run jobs with bounded concurrency.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::VidqConfig;
use crate::control::JobControl;
use crate::queue_db::{DownloadJob, QueueDb};

use super::guard::Registration;
use super::pipeline::{JobOutcome, JobReport, Pipeline};

/// Loop timing and capacity.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Sleep between claims when the backlog is empty (doubled after a claim error).
    pub poll_interval: Duration,
    /// Jobs in flight at once; at least 1.
    pub max_concurrent: usize,
    /// How long in-flight jobs get to finish after a stop before they are aborted.
    pub stop_grace: Duration,
}

impl From<&VidqConfig> for WorkerSettings {
    fn from(cfg: &VidqConfig) -> Self {
        WorkerSettings {
            poll_interval: cfg.poll_interval(),
            max_concurrent: cfg.max_concurrent,
            stop_grace: cfg.stop_grace(),
        }
    }
}

/// Counts of how jobs ended during one `run`/`drain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u32,
    pub failed: u32,
    /// Terminal write missing; left for recovery.
    pub unrecorded: u32,
    /// Tasks aborted after the stop grace period, or lost to a join error.
    pub abandoned: u32,
}

impl RunSummary {
    pub fn processed(&self) -> u32 {
        self.completed + self.failed + self.unrecorded + self.abandoned
    }

    fn record(&mut self, joined: Result<JobReport, JoinError>) {
        match joined {
            Ok(report) => match report.outcome {
                JobOutcome::Completed(_) => self.completed += 1,
                JobOutcome::Failed(_) => self.failed += 1,
                JobOutcome::Unrecorded(_) => self.unrecorded += 1,
            },
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "job task join failed");
                }
                self.abandoned += 1;
            }
        }
    }
}

/// One worker identity: claims from the shared queue and runs jobs on this process.
pub struct Worker {
    db: QueueDb,
    pipeline: Arc<Pipeline>,
    control: Arc<JobControl>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(pipeline: Pipeline, settings: WorkerSettings) -> Self {
        Worker {
            db: pipeline.db().clone(),
            pipeline: Arc::new(pipeline),
            control: Arc::new(JobControl::new()),
            settings: WorkerSettings {
                max_concurrent: settings.max_concurrent.max(1),
                ..settings
            },
        }
    }

    pub fn from_config(db: QueueDb, cfg: &VidqConfig) -> Result<Self> {
        Ok(Worker::new(Pipeline::from_config(db, cfg)?, WorkerSettings::from(cfg)))
    }

    pub fn worker_id(&self) -> &str {
        self.pipeline.worker_id()
    }

    /// Registry of in-flight jobs, for cancelling a single job from outside.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    /// Reset jobs this identity left `running`. Failures are logged, not fatal.
    pub async fn recover(&self) -> u64 {
        match self.db.recover_worker_jobs(self.worker_id()).await {
            Ok(0) => 0,
            Ok(n) => {
                tracing::info!(worker_id = %self.worker_id(), jobs = n, "recovered stranded jobs");
                n
            }
            Err(e) => {
                tracing::warn!(worker_id = %self.worker_id(), error = %format!("{e:#}"), "recovery failed");
                0
            }
        }
    }

    /// Poll loop until `stop` fires. Recovery runs first.
    ///
    /// Never waits on a job before claiming the next one while under
    /// capacity. Claim errors are logged and back off for twice the poll
    /// interval.
    pub async fn run(&self, stop: &CancellationToken) -> Result<RunSummary> {
        self.recover().await;
        tracing::info!(
            worker_id = %self.worker_id(),
            max_concurrent = self.settings.max_concurrent,
            "worker started"
        );

        let mut tasks: JoinSet<JobReport> = JoinSet::new();
        let mut summary = RunSummary::default();

        while !stop.is_cancelled() {
            let delay = if tasks.len() < self.settings.max_concurrent {
                match self.claim(stop).await {
                    Ok(Some(job)) => {
                        self.spawn_job(&mut tasks, job);
                        continue;
                    }
                    Ok(None) => self.settings.poll_interval,
                    Err(e) => {
                        tracing::warn!(worker_id = %self.worker_id(), error = %format!("{e:#}"), "claim failed");
                        self.settings.poll_interval * 2
                    }
                }
            } else {
                self.settings.poll_interval
            };

            tokio::select! {
                _ = stop.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => summary.record(joined),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shutdown(&mut tasks, &mut summary).await;
        tracing::info!(worker_id = %self.worker_id(), ?summary, "worker stopped");
        Ok(summary)
    }

    /// Recover, then run claimable jobs until the backlog is empty (or `stop` fires).
    ///
    /// A claim error stops claiming until an in-flight job finishes or the
    /// backoff elapses; jobs already running are always reaped. The error
    /// is returned only once nothing is in flight.
    pub async fn drain(&self, stop: &CancellationToken) -> Result<RunSummary> {
        self.recover().await;

        let mut tasks: JoinSet<JobReport> = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            let mut backoff = None;
            while tasks.len() < self.settings.max_concurrent && !stop.is_cancelled() {
                match self.claim(stop).await {
                    Ok(Some(job)) => self.spawn_job(&mut tasks, job),
                    Ok(None) => break,
                    Err(e) if tasks.is_empty() => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            worker_id = %self.worker_id(),
                            in_flight = tasks.len(),
                            error = %format!("{e:#}"),
                            "claim failed"
                        );
                        backoff = Some(self.settings.poll_interval * 2);
                        break;
                    }
                }
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = stop.cancelled() => {
                    self.shutdown(&mut tasks, &mut summary).await;
                    break;
                }
                Some(joined) = tasks.join_next() => summary.record(joined),
                _ = tokio::time::sleep(backoff.unwrap_or_default()), if backoff.is_some() => {}
            }
        }

        Ok(summary)
    }

    /// Claim and run one job inline. `None` when the backlog is empty.
    pub async fn run_next(&self) -> Result<Option<JobReport>> {
        let Some(job) = self.db.claim_next(self.worker_id()).await? else {
            return Ok(None);
        };
        let token = self.control.register(job.id);
        let _registration = Registration::new(Arc::clone(&self.control), job.id);
        Ok(Some(Arc::clone(&self.pipeline).execute(job, token).await))
    }

    /// Claim the next job unless `stop` fires first.
    ///
    /// A claim interrupted by `stop` may still be waiting on another
    /// process's write lock. It gets up to the stop grace to finish, and a
    /// job it took anyway is released back to `pending`.
    pub(super) async fn claim(&self, stop: &CancellationToken) -> Result<Option<DownloadJob>> {
        let claim = self.db.claim_next(self.worker_id());
        tokio::pin!(claim);
        tokio::select! {
            biased;
            res = &mut claim => res,
            _ = stop.cancelled() => {
                if let Ok(Ok(Some(job))) = tokio::time::timeout(self.settings.stop_grace, claim).await {
                    match self.db.release_job(job.id, self.worker_id()).await {
                        Ok(_) => tracing::debug!(job_id = job.id, "released job claimed during stop"),
                        Err(e) => tracing::warn!(
                            job_id = job.id,
                            error = %format!("{e:#}"),
                            "release failed; job left for recovery"
                        ),
                    }
                }
                Ok(None)
            }
        }
    }

    fn spawn_job(&self, tasks: &mut JoinSet<JobReport>, job: DownloadJob) {
        tracing::info!(worker_id = %self.worker_id(), job_id = job.id, video_id = job.video_id, "job claimed");
        let token = self.control.register(job.id);
        let registration = Registration::new(Arc::clone(&self.control), job.id);
        let pipeline = Arc::clone(&self.pipeline);
        tasks.spawn(async move {
            let _registration = registration;
            pipeline.execute(job, token).await
        });
    }

    /// Cancel every in-flight job, wait up to the grace period, then abort the rest.
    async fn shutdown(&self, tasks: &mut JoinSet<JobReport>, summary: &mut RunSummary) {
        if tasks.is_empty() {
            return;
        }
        tracing::info!(in_flight = tasks.len(), "stopping in-flight jobs");
        self.control.abort_all();

        let drained = tokio::time::timeout(self.settings.stop_grace, async {
            while let Some(joined) = tasks.join_next().await {
                summary.record(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "grace period elapsed; aborting jobs");
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                summary.record(joined);
            }
        }
    }
}
