//! Operator reset: clear the suppression cache on `SIGUSR1`.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::suppression::SuppressionCache;

/// Spawn a task that clears `suppression` each time the process receives
/// `SIGUSR1`, so already patched archives can be patched again.
///
/// The handler is installed before this returns. On platforms without
/// `SIGUSR1` no task is started and `Ok(None)` is returned.
#[cfg(unix)]
pub fn spawn_reset_listener(
    suppression: Arc<SuppressionCache>,
) -> std::io::Result<Option<JoinHandle<()>>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut signals = signal(SignalKind::user_defined1())?;
    let handle = tokio::spawn(async move {
        while signals.recv().await.is_some() {
            let cleared = suppression.reset_all();
            crate::log_event!(
                "reset",
                "received SIGUSR1",
                "cleared {cleared} archives from the ignore cache"
            );
        }
    });
    Ok(Some(handle))
}

#[cfg(not(unix))]
pub fn spawn_reset_listener(
    _suppression: Arc<SuppressionCache>,
) -> std::io::Result<Option<JoinHandle<()>>> {
    crate::debug_event!("reset", "no SIGUSR1 on this platform, reset listener disabled");
    Ok(None)
}
