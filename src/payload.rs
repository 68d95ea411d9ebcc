//! The set of entries injected into every patched archive.
//!
//! A [`PayloadSet`] is built once at startup and never mutated afterwards;
//! patch tasks share it through an `Arc`.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use crate::config::PayloadConfig;

/// Bytes of the bundled default payload.
const HELLO_TXT: &[u8] = include_bytes!("../resources/hello.txt");

/// Entry names that receive the bundled payload when none are configured.
const DEFAULT_ENTRIES: [&str; 3] = ["a/test.txt", "b/test.txt", "c/test.txt"];

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Failed to read payload for '{name}' from {path}: {source}")]
    Read {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid payload entry name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// Ordered mapping from archive entry name to replacement bytes.
///
/// Names are unique. Order is the order entries were inserted, which is also
/// the order in which absent entries are appended to an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSet {
    entries: IndexMap<String, Vec<u8>>,
}

impl PayloadSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in payload: `a/test.txt`, `b/test.txt` and `c/test.txt`,
    /// all carrying `resources/hello.txt`.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        for name in DEFAULT_ENTRIES {
            set.entries.insert(name.to_string(), HELLO_TXT.to_vec());
        }
        set
    }

    /// Build from configuration, reading each configured file.
    ///
    /// Relative paths are resolved against `base_dir`. An empty entry table
    /// yields [`PayloadSet::builtin`].
    pub fn from_config(config: &PayloadConfig, base_dir: &Path) -> Result<Self, PayloadError> {
        if config.entries.is_empty() {
            return Ok(Self::builtin());
        }

        let mut set = Self::new();
        for (name, source) in &config.entries {
            let path = if source.is_absolute() {
                source.clone()
            } else {
                base_dir.join(source)
            };
            let bytes = std::fs::read(&path).map_err(|source| PayloadError::Read {
                name: name.clone(),
                path: path.clone(),
                source,
            })?;
            set.insert(name, bytes)?;
        }
        Ok(set)
    }

    /// Insert or replace an entry. The name is normalized to archive form.
    pub fn insert(&mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Result<(), PayloadError> {
        let name = normalize_entry_name(name)?;
        self.entries.insert(name, bytes.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Archive entry names use `/` separators and never start with one.
fn normalize_entry_name(name: &str) -> Result<String, PayloadError> {
    let normalized = name.replace('\\', "/");
    let normalized = normalized.trim_start_matches('/');

    if normalized.is_empty() {
        return Err(PayloadError::InvalidName {
            name: name.to_string(),
            reason: "name is empty",
        });
    }
    if normalized.ends_with('/') {
        return Err(PayloadError::InvalidName {
            name: name.to_string(),
            reason: "name denotes a directory",
        });
    }

    Ok(normalized.to_string())
}
