//! Error types for archive patching.

use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

/// Errors from a single patch attempt.
///
/// None of these are retried. In every case the original archive is left as
/// it was, since the final rename is the only step that touches it.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Cannot open {path} as an archive: {source}")]
    Open { path: PathBuf, source: ZipError },

    #[error(
        "Refusing to patch {path}: {records} central directory records but only {unique} distinct names"
    )]
    DuplicateEntries {
        path: PathBuf,
        records: u64,
        unique: usize,
    },

    #[error("Cannot create temporary file next to {path}: {source}")]
    TempFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to rewrite entry '{entry}' of {path}: {source}")]
    Entry {
        path: PathBuf,
        entry: String,
        source: ZipError,
    },

    #[error("I/O error while writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to finalize archive for {path}: {source}")]
    Finish { path: PathBuf, source: ZipError },

    #[error("Failed to replace {path} with patched archive: {source}")]
    Commit {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PatchError {
    /// The archive this error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            PatchError::Open { path, .. }
            | PatchError::DuplicateEntries { path, .. }
            | PatchError::TempFile { path, .. }
            | PatchError::Entry { path, .. }
            | PatchError::Io { path, .. }
            | PatchError::Finish { path, .. }
            | PatchError::Commit { path, .. } => path,
        }
    }
}
