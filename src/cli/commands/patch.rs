//! Patch command - one-shot patching of explicit archives.

use std::path::{Path, PathBuf};

use crate::archive::patch_archive;
use crate::config::Settings;
use crate::payload::PayloadSet;
use crate::watcher::SuppressionCache;

/// Patch each archive once. Fails if any archive could not be patched.
pub fn run_patch(settings: &Settings, archives: &[PathBuf], base_dir: &Path) -> anyhow::Result<()> {
    let payload = PayloadSet::from_config(&settings.payload, base_dir)?;
    let suppression = SuppressionCache::new();

    let mut failed = 0usize;
    for archive in archives {
        let path = std::path::absolute(archive)?;
        match patch_archive(&path, &payload, &suppression) {
            Ok(report) => println!(
                "{}: {} replaced, {} added, {} copied",
                path.display(),
                report.replaced.len(),
                report.added.len(),
                report.copied
            ),
            Err(e) => {
                tracing::error!("[patch] {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} archives could not be patched", archives.len());
    }
    Ok(())
}
