//! The patch engine: rewrite one archive with payload overrides, then commit.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tempfile::{NamedTempFile, PersistError};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::directory::central_directory_records;
use super::error::PatchError;
use crate::payload::PayloadSet;
use crate::watcher::SuppressionCache;

/// What a successful patch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Entries whose content was replaced, in archive order.
    pub replaced: Vec<String>,
    /// Payload entries the archive lacked, appended in payload order.
    pub added: Vec<String>,
    /// Entries copied through unchanged.
    pub copied: usize,
}

impl PatchReport {
    /// Number of entries in the patched archive.
    pub fn total_entries(&self) -> usize {
        self.replaced.len() + self.added.len() + self.copied
    }
}

/// Payload entries not yet written during one rewrite.
///
/// Lives only for a single patch. An entry leaves the snapshot the first
/// time an archive entry with its name is seen, so a later duplicate of that
/// name is copied unchanged.
struct ArchiveSnapshot<'a> {
    pending: IndexMap<&'a str, &'a [u8]>,
}

impl<'a> ArchiveSnapshot<'a> {
    fn new(payload: &'a PayloadSet) -> Self {
        Self {
            pending: payload.iter().collect(),
        }
    }

    fn take(&mut self, name: &str) -> Option<&'a [u8]> {
        self.pending.shift_remove(name)
    }

    fn into_remaining(self) -> impl Iterator<Item = (&'a str, &'a [u8])> {
        self.pending.into_iter()
    }
}

/// Patch the archive at `path` in place.
///
/// The archive is rewritten into a hidden `.swp` sibling, `path` is marked in
/// `suppression`, and the sibling is renamed over the original. If the rename
/// fails the mark is removed again, so a failed commit does not hide later
/// writes. Both file handles are released on every return path and the
/// sibling is deleted unless it was committed.
///
/// Archives that repeat an entry name are refused with
/// [`PatchError::DuplicateEntries`] before any sibling is created.
pub fn patch_archive(
    path: &Path,
    payload: &PayloadSet,
    suppression: &SuppressionCache,
) -> Result<PatchReport, PatchError> {
    let open_err = |e: std::io::Error| PatchError::Open {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let source_file = File::open(path).map_err(open_err)?;
    let permissions = source_file.metadata().map_err(open_err)?.permissions();
    let mut reader = BufReader::new(source_file);
    let records = central_directory_records(&mut reader).map_err(open_err)?;
    reader.rewind().map_err(open_err)?;
    let mut source = ZipArchive::new(reader).map_err(|source| PatchError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    // Repeated names collapse into one entry in `source`; rewriting would
    // silently drop the rest.
    if let Some(records) = records
        && records != source.len() as u64
    {
        return Err(PatchError::DuplicateEntries {
            path: path.to_path_buf(),
            records,
            unique: source.len(),
        });
    }

    let temp = create_sibling(path)?;
    let mut writer = ZipWriter::new(temp);

    let report = rewrite(path, &mut source, &mut writer, payload)?;

    let temp = writer.finish().map_err(|source| PatchError::Finish {
        path: path.to_path_buf(),
        source,
    })?;
    drop(source);

    let io_err = |source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    };
    temp.as_file().sync_all().map_err(io_err)?;
    std::fs::set_permissions(temp.path(), permissions).map_err(io_err)?;

    commit(temp, path, suppression, |temp, path| temp.persist(path))?;

    for name in &report.replaced {
        crate::log_event!("patch", "updated", "{}:{name}", path.display());
    }
    for name in &report.added {
        crate::log_event!("patch", "added", "{}:{name}", path.display());
    }

    Ok(report)
}

/// Rename `temp` over `path` with `path` marked in `suppression`.
///
/// Marked before the rename so the dispatcher never sees an unmarked write
/// from our own commit. On failure the mark is removed and `temp` is dropped,
/// which deletes it.
fn commit<F>(
    temp: NamedTempFile,
    path: &Path,
    suppression: &SuppressionCache,
    persist: F,
) -> Result<(), PatchError>
where
    F: FnOnce(NamedTempFile, &Path) -> Result<File, PersistError>,
{
    suppression.mark(path);
    if let Err(e) = persist(temp, path) {
        suppression.unmark(path);
        return Err(PatchError::Commit {
            path: path.to_path_buf(),
            source: e.error,
        });
    }
    Ok(())
}

/// Create `.<name>.<random>.swp` in the archive's own directory.
///
/// Same directory keeps the final rename atomic; the leading dot and `.swp`
/// suffix keep the work in progress out of listings and out of the archive
/// extension filter.
fn create_sibling(path: &Path) -> Result<NamedTempFile, PatchError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".swp")
        .tempfile_in(&dir)
        .map_err(|source| PatchError::TempFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Stream every entry of `source` into `writer`, applying overrides.
fn rewrite<R, W>(
    path: &Path,
    source: &mut ZipArchive<R>,
    writer: &mut ZipWriter<W>,
    payload: &PayloadSet,
) -> Result<PatchReport, PatchError>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let entry_err = |entry: &str, source| PatchError::Entry {
        path: path.to_path_buf(),
        entry: entry.to_string(),
        source,
    };

    let mut snapshot = ArchiveSnapshot::new(payload);
    let mut report = PatchReport::default();

    for index in 0..source.len() {
        let entry = source
            .by_index_raw(index)
            .map_err(|e| entry_err(&format!("#{index}"), e))?;
        let name = entry.name().to_string();

        match snapshot.take(&name) {
            Some(bytes) => {
                let options = inherited_options(
                    &name,
                    entry.compression(),
                    entry.last_modified(),
                    entry.unix_mode(),
                    bytes.len(),
                );
                drop(entry);
                writer
                    .start_file(name.as_str(), options)
                    .map_err(|e| entry_err(&name, e))?;
                writer
                    .write_all(bytes)
                    .map_err(|e| entry_err(&name, e.into()))?;
                report.replaced.push(name);
            }
            None => {
                writer
                    .raw_copy_file(entry)
                    .map_err(|e| entry_err(&name, e))?;
                report.copied += 1;
            }
        }
    }

    for (name, bytes) in snapshot.into_remaining() {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .large_file(is_large(bytes.len()));
        writer
            .start_file(name, options)
            .map_err(|e| entry_err(name, e))?;
        writer
            .write_all(bytes)
            .map_err(|e| entry_err(name, e.into()))?;
        report.added.push(name.to_string());
    }

    Ok(report)
}

/// Options for a replaced entry, carried over from the entry it replaces.
///
/// Modification time and unix mode are kept as they were. Only `Stored` and
/// `Deflated` can be written by this build, so an entry compressed any other
/// way (bzip2, zstd, ...) comes back deflated and its method field changes.
fn inherited_options(
    name: &str,
    compression: CompressionMethod,
    modified: Option<DateTime>,
    unix_mode: Option<u32>,
    len: usize,
) -> SimpleFileOptions {
    let compression = match compression {
        CompressionMethod::Stored => CompressionMethod::Stored,
        CompressionMethod::Deflated => CompressionMethod::Deflated,
        other => {
            crate::debug_event!("patch", "re-deflating", "{name} was {other}");
            CompressionMethod::Deflated
        }
    };

    let mut options = SimpleFileOptions::default()
        .compression_method(compression)
        .last_modified_time(modified.unwrap_or_default())
        .large_file(is_large(len));
    if let Some(mode) = unix_mode {
        options = options.unix_permissions(mode);
    }
    options
}

fn is_large(len: usize) -> bool {
    len as u64 >= u32::MAX as u64
}
