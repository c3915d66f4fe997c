//! Uniquely named temp files that delete themselves.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::queue_db::{unix_millis, JobId};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A download target under the worker's temp dir.
///
/// The file (if any was created) is removed when the guard drops, whether
/// the job succeeded, failed, panicked or was cancelled.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    /// Reserve a name like `download-<millis>-<job>-<pid>-<n>.tmp` in `dir`.
    /// Nothing is created on disk until the fetcher opens the path.
    pub fn new_in(dir: &Path, job_id: JobId) -> Self {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "download-{}-{}-{}-{}.tmp",
            unix_millis(),
            job_id,
            std::process::id(),
            n
        );
        TempFile {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

/// Remove a file, ignoring "not found"; other errors are logged.
pub(crate) fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempFile::new_in(dir.path(), 7);
        let b = TempFile::new_in(dir.path(), 7);
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("download-"));

        std::fs::write(a.path(), b"partial").unwrap();
        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
        // Never created: drop is a no-op.
        drop(b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
