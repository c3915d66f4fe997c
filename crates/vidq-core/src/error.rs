//! Job failure taxonomy.
//!
//! Every way a claimed job can end other than success maps to one `JobError`.
//! The `Display` form starts with the kind name, and that string is what ends
//! up in `last_error` on both the job and the video.

use std::fmt;

use crate::queue_db::VideoId;

/// Pipeline stage, recorded when a job is cancelled mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Resolve,
    Fetch,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Upload => "upload",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("NotFound: video {0} does not exist")]
    NotFound(VideoId),

    #[error("Gone: video {0} was deleted")]
    Gone(VideoId),

    #[error("ResolutionFailed: {0}")]
    ResolutionFailed(String),

    #[error("TransferFailed: {0}")]
    TransferFailed(String),

    #[error("StorageFailed: {0}")]
    StorageFailed(String),

    #[error("Cancelled: stopped during {0}")]
    Cancelled(Stage),

    /// Anything unexpected, including store errors and panics inside a stage.
    #[error("Aborted: {0}")]
    Aborted(String),
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::NotFound(_) => "NotFound",
            JobError::Gone(_) => "Gone",
            JobError::ResolutionFailed(_) => "ResolutionFailed",
            JobError::TransferFailed(_) => "TransferFailed",
            JobError::StorageFailed(_) => "StorageFailed",
            JobError::Cancelled(_) => "Cancelled",
            JobError::Aborted(_) => "Aborted",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled(_))
    }

    /// Short diagnostic suitable for a `last_error` column.
    pub fn diagnostic(&self) -> String {
        crate::queue_db::truncate_diagnostic(&self.to_string())
    }
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::Aborted(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_starts_with_kind() {
        let cases = [
            JobError::NotFound(3),
            JobError::Gone(3),
            JobError::ResolutionFailed("no media url".into()),
            JobError::TransferFailed("HTTP 403".into()),
            JobError::StorageFailed("bucket rejected".into()),
            JobError::Cancelled(Stage::Fetch),
            JobError::Aborted("boom".into()),
        ];
        for e in cases {
            assert!(e.to_string().starts_with(e.kind()), "{e}");
        }
    }

    #[test]
    fn anyhow_becomes_aborted_with_context_chain() {
        let err = anyhow::anyhow!("disk full").context("write temp file");
        let e = JobError::from(err);
        assert_eq!(e.kind(), "Aborted");
        assert_eq!(e.to_string(), "Aborted: write temp file: disk full");
    }

    #[test]
    fn diagnostic_is_bounded() {
        let e = JobError::TransferFailed("x".repeat(4000));
        assert_eq!(e.diagnostic().len(), 512);
        assert!(JobError::Cancelled(Stage::Upload)
            .diagnostic()
            .contains("upload"));
    }
}
