//! RAII guards for in-flight jobs.

use std::sync::Arc;

use tokio::task::AbortHandle;

use crate::control::JobControl;
use crate::queue_db::JobId;

/// Removes a job from the control registry when dropped, including when
/// its task is aborted.
pub(super) struct Registration {
    control: Arc<JobControl>,
    job_id: JobId,
}

impl Registration {
    pub(super) fn new(control: Arc<JobControl>, job_id: JobId) -> Self {
        Registration { control, job_id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.control.unregister(self.job_id);
    }
}

/// Aborts the stage task when the owning future is dropped, so its temp
/// file guard runs instead of the task outliving the worker.
pub(super) struct AbortOnDrop(pub(super) AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
