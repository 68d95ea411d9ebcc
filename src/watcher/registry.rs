//! The set of directories registered with the OS watcher.
//!
//! Watches are always non-recursive at the OS level; recursive coverage is
//! built here by registering every directory of a subtree individually and
//! extending the set as new directories appear.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use walkdir::WalkDir;

use super::error::WatchError;

/// Owns the OS watcher and the directories registered with it.
///
/// Directories are never removed; a watch on a deleted directory just goes
/// quiet.
#[derive(Debug)]
pub struct WatchRegistry<W: Watcher = RecommendedWatcher> {
    watcher: W,
    watched: HashSet<PathBuf>,
}

impl<W: Watcher> WatchRegistry<W> {
    /// Wrap an OS watcher with an empty watch set.
    pub fn new(watcher: W) -> Self {
        Self {
            watcher,
            watched: HashSet::new(),
        }
    }

    /// Register a single directory.
    ///
    /// Returns `false` when the directory was already watched.
    pub fn add_watch(&mut self, dir: &Path) -> Result<bool, WatchError> {
        if self.watched.contains(dir) {
            return Ok(false);
        }

        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Registration {
                path: dir.to_path_buf(),
                source,
            })?;
        self.watched.insert(dir.to_path_buf());
        crate::log_event!("watcher", "added a watch", "{}", dir.display());
        Ok(true)
    }

    /// Register every directory [`discover`](Self::discover) finds under `roots`.
    ///
    /// Fails on the first registration error, and with
    /// [`WatchError::NoDirectories`] if nothing ends up watched.
    pub fn populate(&mut self, roots: &[PathBuf], recursive: bool) -> Result<usize, WatchError> {
        if recursive {
            crate::log_event!(
                "watcher",
                "recursion enabled",
                "adding watches for the given directories and all subdirectories"
            );
        }

        for dir in Self::discover(roots, recursive) {
            self.add_watch(&dir)?;
        }

        if self.watched.is_empty() {
            return Err(WatchError::NoDirectories);
        }
        Ok(self.watched.len())
    }

    /// Register a directory that appeared under a recursive watch, then its
    /// existing subdirectories.
    ///
    /// The rescan picks up subdirectories created before this watch was in
    /// place (`mkdir -p` racing the event). Subdirectories that vanish during
    /// the rescan are skipped. Returns every newly watched directory.
    pub fn extend(&mut self, dir: &Path) -> Result<Vec<PathBuf>, WatchError> {
        let mut added = Vec::new();
        if self.add_watch(dir)? {
            added.push(dir.to_path_buf());
        }

        let subdirs = WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .map(walkdir::DirEntry::into_path);

        for subdir in subdirs {
            match self.add_watch(&subdir) {
                Ok(true) => added.push(subdir),
                Ok(false) => {}
                Err(WatchError::Registration { ref source, .. }) if is_vanished(source) => {
                    crate::debug_event!("watcher", "vanished", "{}", subdir.display());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(added)
    }

    /// Directories to watch for `roots`, absolute and deduplicated, in order.
    ///
    /// Nonexistent roots and roots that are not directories are skipped. In
    /// recursive mode each root contributes itself and every descendant
    /// directory; unreadable parts of a tree are skipped.
    pub fn discover(roots: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut dirs = Vec::new();

        for root in roots {
            let Ok(root) = std::path::absolute(root) else {
                continue;
            };
            if !root.is_dir() {
                crate::debug_event!("watcher", "skipping non-directory", "{}", root.display());
                continue;
            }

            if recursive {
                let subtree = WalkDir::new(&root)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|entry| entry.file_type().is_dir())
                    .map(walkdir::DirEntry::into_path);
                for dir in subtree {
                    if seen.insert(dir.clone()) {
                        dirs.push(dir);
                    }
                }
            } else if seen.insert(root.clone()) {
                dirs.push(root);
            }
        }

        dirs
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

fn is_vanished(error: &notify::Error) -> bool {
    match &error.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(io) => io.kind() == ErrorKind::NotFound,
        _ => false,
    }
}
