//! The event loop that turns filesystem notifications into patches and watches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::archive::patch_archive;
use crate::config::WatchConfig;
use crate::payload::PayloadSet;

use super::error::WatchError;
use super::inflight::InFlight;
use super::registry::WatchRegistry;
use super::suppression::SuppressionCache;

/// What the dispatcher decided to do with one path of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// An archive finished writing and should be patched.
    Patch(PathBuf),
    /// An archive finished writing but the write was our own.
    Suppressed(PathBuf),
    /// A directory appeared under a recursive watch.
    Watch(PathBuf),
}

/// Single control loop over OS notifications.
///
/// Events are classified strictly in arrival order. Each qualifying archive
/// is patched on its own blocking task, with no limit on how many run at
/// once; only one patch per path runs at a time.
pub struct Dispatcher<W: Watcher = RecommendedWatcher> {
    registry: WatchRegistry<W>,
    event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    config: WatchConfig,
    payload: Arc<PayloadSet>,
    suppression: Arc<SuppressionCache>,
    inflight: InFlight,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    /// Create a builder wired to the platform's recommended watcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }
}

impl<W: Watcher> Dispatcher<W> {
    /// Assemble a dispatcher from an already populated registry and the
    /// receiving end of the channel its watcher feeds.
    pub fn new(
        registry: WatchRegistry<W>,
        event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        config: WatchConfig,
        payload: Arc<PayloadSet>,
        suppression: Arc<SuppressionCache>,
    ) -> Self {
        Self {
            registry,
            event_rx,
            config,
            payload,
            suppression,
            inflight: InFlight::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn registry(&self) -> &WatchRegistry<W> {
        &self.registry
    }

    pub fn suppression(&self) -> &Arc<SuppressionCache> {
        &self.suppression
    }

    /// Run until the notification channel closes.
    ///
    /// Error notifications are logged and the loop continues. A failed watch
    /// registration ends the loop with an error. When the channel closes, the
    /// loop waits for patches already running before returning.
    pub async fn run(mut self) -> Result<(), WatchError> {
        crate::log_event!(
            "watcher",
            "started",
            "{} directories, recursive={}",
            self.registry.len(),
            self.config.recursive
        );

        loop {
            tokio::select! {
                res = self.event_rx.recv() => {
                    match res {
                        Some(Ok(event)) => self.handle_event(&event)?,
                        Some(Err(e)) => tracing::error!("[watcher] file watch error: {e}"),
                        None => break,
                    }
                }

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("[patch] task failed: {e}");
                    }
                }
            }
        }

        crate::debug_event!("watcher", "channel closed", "{} patches pending", self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("[patch] task failed: {e}");
            }
        }
        crate::log_event!("watcher", "stopped");
        Ok(())
    }

    /// Classify one event and act on it.
    pub fn handle_event(&mut self, event: &Event) -> Result<(), WatchError> {
        for dispatch in self.classify(event) {
            match dispatch {
                Dispatch::Patch(path) => self.spawn_patch(path),
                Dispatch::Suppressed(path) => {
                    crate::log_event!(
                        "watcher",
                        "already patched",
                        "{} (send SIGUSR1 to clear the cache and patch it again)",
                        path.display()
                    );
                }
                Dispatch::Watch(dir) => {
                    self.registry.extend(&dir)?;
                }
            }
        }
        Ok(())
    }

    /// Decide what each path of `event` calls for.
    ///
    /// Paths that can no longer be stat'ed are dropped silently.
    pub fn classify(&self, event: &Event) -> Vec<Dispatch> {
        let closed_after_write = matches!(
            event.kind,
            EventKind::Access(AccessKind::Close(AccessMode::Write))
        );
        let created = matches!(event.kind, EventKind::Create(_));

        if !closed_after_write && !created {
            return Vec::new();
        }

        let mut dispatches = Vec::new();
        for path in &event.paths {
            let Ok(metadata) = std::fs::metadata(path) else {
                crate::debug_event!("watcher", "vanished", "{}", path.display());
                continue;
            };

            if closed_after_write && metadata.is_file() && self.config.is_archive(path) {
                let Ok(archive) = std::path::absolute(path) else {
                    continue;
                };
                crate::log_event!("watcher", "archive written", "{}", archive.display());
                if self.suppression.should_ignore(&archive) {
                    dispatches.push(Dispatch::Suppressed(archive));
                } else {
                    dispatches.push(Dispatch::Patch(archive));
                }
            }

            if created && metadata.is_dir() && self.config.recursive {
                dispatches.push(Dispatch::Watch(path.clone()));
            }
        }
        dispatches
    }

    /// Hand `path` to the patch engine on a blocking task.
    fn spawn_patch(&mut self, path: PathBuf) {
        let Some(guard) = self.inflight.try_acquire(&path) else {
            crate::log_event!("watcher", "patch already running, dropped", "{}", path.display());
            return;
        };

        let payload = Arc::clone(&self.payload);
        let suppression = Arc::clone(&self.suppression);
        self.tasks.spawn_blocking(move || {
            let path = guard.path();
            match patch_archive(path, &payload, &suppression) {
                Ok(report) => crate::log_event!(
                    "patch",
                    "done",
                    "{} ({} replaced, {} added, {} copied)",
                    path.display(),
                    report.replaced.len(),
                    report.added.len(),
                    report.copied
                ),
                Err(e) => tracing::error!("[patch] {e}"),
            }
        });
    }

    /// Whether a patch for `path` is currently running.
    pub fn is_patching(&self, path: &Path) -> bool {
        self.inflight.is_running(path)
    }
}

/// Builder for a [`Dispatcher`] over the recommended OS watcher.
pub struct DispatcherBuilder {
    config: WatchConfig,
    payload: Option<Arc<PayloadSet>>,
    suppression: Option<Arc<SuppressionCache>>,
}

impl DispatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: WatchConfig::default(),
            payload: None,
            suppression: None,
        }
    }

    /// Roots, recursion and extensions.
    pub fn config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the payload injected into archives.
    pub fn payload(mut self, payload: Arc<PayloadSet>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Share a suppression cache, e.g. with the reset listener.
    pub fn suppression(mut self, suppression: Arc<SuppressionCache>) -> Self {
        self.suppression = Some(suppression);
        self
    }

    /// Create the OS watcher and register the configured roots.
    ///
    /// Fails if a directory cannot be watched or none are found.
    pub fn build(self) -> Result<Dispatcher, WatchError> {
        let payload = self.payload.ok_or_else(|| WatchError::InitFailed {
            reason: "Payload is required".to_string(),
        })?;
        let suppression = self.suppression.unwrap_or_default();

        // Unbounded: the notify thread must never block on a full queue, since
        // `extend` waits on that same thread while the loop is not draining.
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        let mut registry = WatchRegistry::new(watcher);
        registry.populate(&self.config.roots, self.config.recursive)?;

        Ok(Dispatcher::new(registry, rx, self.config, payload, suppression))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::CreateKind;
    use std::fs::File;
    use std::io::{Read, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{ZipArchive, ZipWriter};

    fn close_write(path: &Path) -> Event {
        Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write))).add_path(path.into())
    }

    fn create(path: &Path) -> Event {
        Event::new(EventKind::Create(CreateKind::Any)).add_path(path.into())
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_entry(path: &Path, name: &str) -> Option<Vec<u8>> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut entry = archive.by_name(name).ok()?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        Some(bytes)
    }

    /// A dispatcher over `root` plus the sender that feeds it.
    fn dispatcher(
        root: &Path,
        recursive: bool,
    ) -> (Dispatcher, mpsc::UnboundedSender<notify::Result<Event>>) {
        let watcher = notify::recommended_watcher(|_: notify::Result<Event>| {}).unwrap();
        let mut registry = WatchRegistry::new(watcher);
        registry.populate(&[root.to_path_buf()], recursive).unwrap();

        let mut payload = PayloadSet::new();
        payload.insert("a/test.txt", b"HELLO".to_vec()).unwrap();

        let config = WatchConfig {
            roots: vec![root.to_path_buf()],
            recursive,
            ..WatchConfig::default()
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            registry,
            rx,
            config,
            Arc::new(payload),
            Arc::new(SuppressionCache::new()),
        );
        (dispatcher, tx)
    }

    #[test]
    fn test_classify_archive_close_write() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("app.jar");
        write_jar(&jar, &[("x", b"x")]);
        let (dispatcher, _tx) = dispatcher(temp_dir.path(), false);

        assert_eq!(
            dispatcher.classify(&close_write(&jar)),
            vec![Dispatch::Patch(jar.clone())]
        );

        dispatcher.suppression().mark(&jar);
        assert_eq!(
            dispatcher.classify(&close_write(&jar)),
            vec![Dispatch::Suppressed(jar)]
        );
    }

    #[test]
    fn test_classify_ignores_non_archives_and_other_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let text = temp_dir.path().join("notes.txt");
        let jar = temp_dir.path().join("app.jar");
        std::fs::write(&text, b"hi").unwrap();
        write_jar(&jar, &[("x", b"x")]);
        let (dispatcher, _tx) = dispatcher(temp_dir.path(), false);

        assert!(dispatcher.classify(&close_write(&text)).is_empty());
        assert!(dispatcher.classify(&create(&jar)).is_empty());

        let modify = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(jar.clone());
        assert!(dispatcher.classify(&modify).is_empty());
    }

    #[test]
    fn test_classify_skips_vanished_paths() {
        let temp_dir = TempDir::new().unwrap();
        let (dispatcher, _tx) = dispatcher(temp_dir.path(), true);

        let gone = temp_dir.path().join("gone.jar");
        assert!(dispatcher.classify(&close_write(&gone)).is_empty());
        assert!(dispatcher.classify(&create(&temp_dir.path().join("gone"))).is_empty());
    }

    #[test]
    fn test_classify_directory_named_like_archive() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("exploded.jar");
        std::fs::create_dir(&dir).unwrap();
        let (dispatcher, _tx) = dispatcher(temp_dir.path(), false);

        assert!(dispatcher.classify(&close_write(&dir)).is_empty());
    }

    #[test]
    fn test_classify_directory_creation_depends_on_recursion() {
        let temp_dir = TempDir::new().unwrap();
        let sub = temp_dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let (flat, _tx) = dispatcher(temp_dir.path(), false);
        assert!(flat.classify(&create(&sub)).is_empty());

        let (recursive, _tx) = dispatcher(temp_dir.path(), true);
        assert_eq!(recursive.classify(&create(&sub)), vec![Dispatch::Watch(sub)]);
    }

    #[tokio::test]
    async fn test_handle_create_extends_registry() {
        let temp_dir = TempDir::new().unwrap();
        let (mut dispatcher, _tx) = dispatcher(temp_dir.path(), true);

        let sub = temp_dir.path().join("sub");
        std::fs::create_dir_all(sub.join("deeper")).unwrap();
        dispatcher.handle_event(&create(&sub)).unwrap();

        assert!(dispatcher.registry().contains(&sub));
        assert!(dispatcher.registry().contains(&sub.join("deeper")));
    }

    #[tokio::test]
    async fn test_run_patches_and_drains_on_close() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("app.jar");
        write_jar(&jar, &[("a/test.txt", b"X"), ("keep.txt", b"K")]);
        let (dispatcher, tx) = dispatcher(temp_dir.path(), false);
        let suppression = Arc::clone(dispatcher.suppression());

        tx.send(Err(notify::Error::generic("spurious"))).unwrap();
        tx.send(Ok(close_write(&jar))).unwrap();
        drop(tx);

        dispatcher.run().await.unwrap();

        assert_eq!(read_entry(&jar, "a/test.txt"), Some(b"HELLO".to_vec()));
        assert_eq!(read_entry(&jar, "keep.txt"), Some(b"K".to_vec()));
        assert!(suppression.should_ignore(&jar));
    }

    #[tokio::test]
    async fn test_run_skips_suppressed_archive() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("app.jar");
        write_jar(&jar, &[("a/test.txt", b"X")]);
        let (dispatcher, tx) = dispatcher(temp_dir.path(), false);
        dispatcher.suppression().mark(&jar);
        let before = std::fs::read(&jar).unwrap();

        tx.send(Ok(close_write(&jar))).unwrap();
        drop(tx);
        dispatcher.run().await.unwrap();

        assert_eq!(std::fs::read(&jar).unwrap(), before);
    }

    #[tokio::test]
    async fn test_run_survives_broken_archive() {
        let temp_dir = TempDir::new().unwrap();
        let broken = temp_dir.path().join("broken.zip");
        let good = temp_dir.path().join("good.zip");
        std::fs::write(&broken, b"not a zip").unwrap();
        write_jar(&good, &[("x", b"x")]);
        let (dispatcher, tx) = dispatcher(temp_dir.path(), false);
        let suppression = Arc::clone(dispatcher.suppression());

        tx.send(Ok(close_write(&broken))).unwrap();
        tx.send(Ok(close_write(&good))).unwrap();
        drop(tx);
        dispatcher.run().await.unwrap();

        assert_eq!(std::fs::read(&broken).unwrap(), b"not a zip");
        assert!(!suppression.should_ignore(&broken));
        assert_eq!(read_entry(&good, "a/test.txt"), Some(b"HELLO".to_vec()));
    }

    #[tokio::test]
    async fn test_second_patch_on_same_path_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("app.jar");
        write_jar(&jar, &[("x", b"x")]);
        let (mut dispatcher, _tx) = dispatcher(temp_dir.path(), false);

        let held = dispatcher.inflight.try_acquire(&jar).unwrap();
        dispatcher.handle_event(&close_write(&jar)).unwrap();

        // Nothing was spawned while the token was held
        assert!(dispatcher.tasks.is_empty());
        assert!(dispatcher.is_patching(&jar));
        drop(held);
        assert!(!dispatcher.is_patching(&jar));
    }

    #[test]
    fn test_builder_requires_payload() {
        let temp_dir = TempDir::new().unwrap();
        let config = WatchConfig {
            roots: vec![temp_dir.path().to_path_buf()],
            ..WatchConfig::default()
        };
        let result = Dispatcher::builder().config(config).build();
        assert!(matches!(result, Err(WatchError::InitFailed { .. })));
    }

    #[test]
    fn test_builder_without_directories_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = WatchConfig {
            roots: vec![temp_dir.path().join("missing")],
            ..WatchConfig::default()
        };
        let result = Dispatcher::builder()
            .config(config)
            .payload(Arc::new(PayloadSet::builtin()))
            .build();
        assert!(matches!(result, Err(WatchError::NoDirectories)));
    }
}
