//! Job control: per-job cancellation tokens and the worker's control socket path.
//!
//! The worker loop registers each claimed job here and passes the returned
//! token into its execution. On stop the worker cancels every registered
//! token (`abort_all`); a control client (e.g. `vidq cancel 7` over the
//! socket) cancels a single job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::queue_db::JobId;

/// Shared registry of job id -> cancellation token.
#[derive(Default)]
pub struct JobControl {
    jobs: Mutex<HashMap<JobId, CancellationToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a claimed job; returns the token to pass into its execution.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.jobs().insert(job_id, token.clone());
        token
    }

    /// Unregister a job (call when the job finishes, success or failure).
    pub fn unregister(&self, job_id: JobId) {
        self.jobs().remove(&job_id);
    }

    /// Cancel one job. Returns false if it is not in flight here.
    pub fn request_abort(&self, job_id: JobId) -> bool {
        match self.jobs().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered job.
    pub fn abort_all(&self) {
        for token in self.jobs().values() {
            token.cancel();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.jobs().len()
    }

    /// Ids of registered jobs, ascending.
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Default path for a worker's control socket (same XDG state dir as the DB).
pub fn default_control_socket_path(worker_id: &str) -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("vidq")?.get_state_home().join("vidq");
    let name: String = worker_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    Ok(dir.join(format!("control-{name}.sock")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_abort_single_job() {
        let control = JobControl::new();
        let a = control.register(1);
        let b = control.register(2);
        assert_eq!(control.in_flight(), 2);
        assert_eq!(control.job_ids(), vec![1, 2]);

        assert!(control.request_abort(1));
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!control.request_abort(9));

        control.unregister(1);
        assert_eq!(control.job_ids(), vec![2]);
    }

    #[test]
    fn abort_all_cancels_registered_jobs_only() {
        let control = JobControl::new();
        let a = control.register(1);
        let b = control.register(2);
        control.abort_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        // Jobs registered after a stop start with a fresh token.
        assert!(!control.register(3).is_cancelled());
    }

    #[test]
    fn socket_name_is_sanitized() {
        let path = default_control_socket_path("worker/a b").unwrap();
        assert!(path.ends_with("control-worker_a_b.sock"));
    }
}
