//! Error types for the watch pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher setup and the dispatch loop.
///
/// Every variant is fatal to a running watcher: an unwatched directory
/// silently loses coverage, so the process stops instead.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("No watchable directories were specified")]
    NoDirectories,

    #[error("Cannot watch directory {path}: {source}")]
    Registration {
        path: PathBuf,
        source: notify::Error,
    },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
