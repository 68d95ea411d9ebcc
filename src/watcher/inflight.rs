//! Per-path token limiting each archive to one running patch.
//!
//! Two close-write events for the same archive can both pass the suppression
//! check before either patch marks it. The dispatcher takes a token here
//! before spawning a patch; a second request while the token is held is
//! dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;

/// Set of archive paths with a patch currently running.
#[derive(Debug, Default, Clone)]
pub struct InFlight {
    paths: Arc<DashSet<PathBuf>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `path`. Returns `None` if a patch already holds it.
    pub fn try_acquire(&self, path: &Path) -> Option<InFlightGuard> {
        if self.paths.insert(path.to_path_buf()) {
            Some(InFlightGuard {
                paths: Arc::clone(&self.paths),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn is_running(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Releases the claim on drop, whether the patch succeeded, failed or panicked.
#[derive(Debug)]
pub struct InFlightGuard {
    paths: Arc<DashSet<PathBuf>>,
    path: PathBuf,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.paths.remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let inflight = InFlight::new();
        let path = Path::new("/data/app.jar");

        let guard = inflight.try_acquire(path).unwrap();
        assert_eq!(guard.path(), path);
        assert!(inflight.is_running(path));
        assert!(inflight.try_acquire(path).is_none());

        // Other paths are independent
        assert!(inflight.try_acquire(Path::new("/data/other.jar")).is_some());

        drop(guard);
        assert!(!inflight.is_running(path));
        assert!(inflight.try_acquire(path).is_some());
    }

    #[test]
    fn test_guard_released_across_threads() {
        let inflight = InFlight::new();
        let guard = inflight.try_acquire(Path::new("/a.zip")).unwrap();

        std::thread::spawn(move || drop(guard)).join().unwrap();

        assert!(inflight.is_empty());
    }
}
