//! Self-write suppression for patched archives.
//!
//! Rewriting an archive produces filesystem activity on the very path the
//! dispatcher is watching. Before committing a rewrite the patch engine marks
//! the path here, and the dispatcher skips close-write events for marked
//! paths. Markers never expire; only [`SuppressionCache::reset_all`] clears
//! them, so each path is patched at most once per reset cycle.

use std::path::{Path, PathBuf};

use dashmap::DashSet;

/// Concurrent set of archive paths whose next writes are our own.
///
/// Shared between the dispatcher, every patch task and the reset trigger.
#[derive(Debug, Default)]
pub struct SuppressionCache {
    marked: DashSet<PathBuf>,
}

impl SuppressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` so subsequent close-write events on it are ignored.
    pub fn mark(&self, path: &Path) {
        self.marked.insert(path.to_path_buf());
    }

    /// Remove the marker for `path`, returning whether one was set.
    pub fn unmark(&self, path: &Path) -> bool {
        self.marked.remove(path).is_some()
    }

    /// Whether a marker is set for `path`. Does not clear it.
    pub fn should_ignore(&self, path: &Path) -> bool {
        self.marked.contains(path)
    }

    /// Clear every marker, returning how many were set.
    pub fn reset_all(&self) -> usize {
        let cleared = self.marked.len();
        self.marked.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_is_sticky_until_reset() {
        let cache = SuppressionCache::new();
        let path = Path::new("/data/app.jar");

        assert!(!cache.should_ignore(path));
        cache.mark(path);

        // Repeated checks keep returning true
        assert!(cache.should_ignore(path));
        assert!(cache.should_ignore(path));
        assert!(!cache.should_ignore(Path::new("/data/other.jar")));

        assert_eq!(cache.reset_all(), 1);
        assert!(!cache.should_ignore(path));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_mark_twice_counts_once() {
        let cache = SuppressionCache::new();
        cache.mark(Path::new("/a.zip"));
        cache.mark(Path::new("/a.zip"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unmark() {
        let cache = SuppressionCache::new();
        let path = Path::new("/data/app.jar");
        cache.mark(path);
        assert!(cache.unmark(path));
        assert!(!cache.unmark(path));
        assert!(!cache.should_ignore(path));
    }

    #[test]
    fn test_concurrent_marks() {
        let cache = Arc::new(SuppressionCache::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.mark(&PathBuf::from(format!("/data/{t}/{i}.jar")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 800);
        assert_eq!(cache.reset_all(), 800);
    }
}
