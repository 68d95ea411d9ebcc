//! Watch command - run the dispatcher until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::payload::PayloadSet;
use crate::watcher::{Dispatcher, SuppressionCache, spawn_reset_listener};

/// Run the watch command.
///
/// Directories given on the command line replace `watch.roots`; `--recurse`
/// turns recursion on regardless of config.
pub async fn run_watch(
    mut settings: Settings,
    dirs: Vec<PathBuf>,
    recurse: bool,
    base_dir: &Path,
) -> anyhow::Result<()> {
    if !dirs.is_empty() {
        settings.watch.roots = dirs;
    }
    settings.watch.recursive |= recurse;

    let payload = PayloadSet::from_config(&settings.payload, base_dir)?;
    crate::debug_event!("watch", "payload", "{} entries", payload.len());

    let suppression = Arc::new(SuppressionCache::new());
    let dispatcher = Dispatcher::builder()
        .config(settings.watch)
        .payload(Arc::new(payload))
        .suppression(Arc::clone(&suppression))
        .build()?;

    spawn_reset_listener(suppression).context("failed to install the SIGUSR1 handler")?;

    tokio::select! {
        res = dispatcher.run() => res?,
        _ = tokio::signal::ctrl_c() => {
            crate::log_event!("watch", "received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
