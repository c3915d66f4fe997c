//! Resolution of a video page into a direct media URL.
//!
//! The pipeline only depends on `Extractor`, which tries an ordered list of
//! `ResolveStrategy` implementations within one time budget. Strategies
//! never write to the store; persisting the result is the caller's job.

mod direct;
mod har;
mod page;
pub mod scan;

pub use direct::DirectProbe;
pub use har::{resolve_har, HarCapture};
pub use page::PageScrape;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, Stage};
use crate::http::HttpSettings;
use crate::queue_db::{MediaMeta, Video, VideoId};

/// What a strategy needs to know about the video being resolved.
#[derive(Debug, Clone)]
pub struct ResolveTarget {
    pub video_id: VideoId,
    pub external_id: String,
    /// Canonical page URL on the platform.
    pub page_url: String,
}

impl From<&Video> for ResolveTarget {
    fn from(v: &Video) -> Self {
        ResolveTarget {
            video_id: v.id,
            external_id: v.external_id.clone(),
            page_url: v.video_url.clone(),
        }
    }
}

/// Direct media URL plus what was learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub meta: MediaMeta,
}

/// One way of turning a page reference into a media URL.
///
/// `Ok(None)` means "not applicable here, try the next one"; `Err` is an
/// attempt that failed. Both fall through to the next strategy.
/// Implementations must return promptly once `cancel` fires.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(
        &self,
        target: &ResolveTarget,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<ResolvedMedia>>;
}

/// Ordered strategy chain with a shared time budget.
pub struct Extractor {
    strategies: Vec<Box<dyn ResolveStrategy>>,
    budget: Duration,
}

/// Knobs for the built-in strategy chain.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub http: HttpSettings,
    /// Total time allowed for all strategies together.
    pub budget: Duration,
    pub har_capture_dir: Option<PathBuf>,
    /// Replay the `Cookie` header captured in a HAR entry.
    pub har_include_cookies: bool,
}

impl Extractor {
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>, budget: Duration) -> Self {
        Extractor { strategies, budget }
    }

    /// Built-in chain: HEAD probe, then HAR capture (when configured), then page scrape.
    pub fn with_defaults(settings: &ExtractorSettings) -> Self {
        let mut strategies: Vec<Box<dyn ResolveStrategy>> =
            vec![Box::new(DirectProbe::new(settings.http.clone(), settings.budget))];
        if let Some(dir) = &settings.har_capture_dir {
            strategies.push(Box::new(HarCapture::new(dir.clone(), settings.har_include_cookies)));
        }
        strategies.push(Box::new(PageScrape::new(settings.http.clone(), settings.budget)));
        Extractor::new(strategies, settings.budget)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve `target`, or fail with `ResolutionFailed` / `Cancelled`.
    pub async fn resolve(
        &self,
        target: &ResolveTarget,
        cancel: &CancellationToken,
    ) -> Result<ResolvedMedia, JobError> {
        // Cancelled when this call returns, so blocking work started by a
        // strategy stops even if the budget expired first.
        let scope = cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JobError::Cancelled(Stage::Resolve)),
            res = tokio::time::timeout(self.budget, self.run_chain(target, &scope)) => match res {
                Ok(res) => res,
                Err(_) => Err(JobError::ResolutionFailed(format!(
                    "no media url within {}s",
                    self.budget.as_secs()
                ))),
            },
        }
    }

    async fn run_chain(
        &self,
        target: &ResolveTarget,
        cancel: &CancellationToken,
    ) -> Result<ResolvedMedia, JobError> {
        let mut notes = Vec::new();
        for strategy in &self.strategies {
            match strategy.resolve(target, cancel).await {
                Ok(Some(mut media)) => {
                    media.meta.source.get_or_insert_with(|| strategy.name().to_string());
                    tracing::debug!(
                        video_id = target.video_id,
                        strategy = strategy.name(),
                        url = %media.url,
                        "resolved media url"
                    );
                    return Ok(media);
                }
                Ok(None) => {
                    tracing::debug!(video_id = target.video_id, strategy = strategy.name(), "no match");
                    notes.push(format!("{}: no match", strategy.name()));
                }
                Err(e) => {
                    tracing::debug!(video_id = target.video_id, strategy = strategy.name(), error = %e, "strategy failed");
                    notes.push(format!("{}: {e:#}", strategy.name()));
                }
            }
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled(Stage::Resolve));
            }
        }
        if notes.is_empty() {
            notes.push("no strategies configured".to_string());
        }
        Err(JobError::ResolutionFailed(notes.join("; ")))
    }
}

/// Run a blocking closure (curl, file parsing) off the async threads.
pub(crate) async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("resolver task failed: {e}"))?
}
