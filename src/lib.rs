//! Watch directories and patch ZIP/JAR archives in place as soon as they
//! are written.
//!
//! The pipeline is [`watcher::Dispatcher`] consuming OS notifications,
//! [`archive::patch_archive`] rewriting archives with a [`PayloadSet`], and
//! [`watcher::SuppressionCache`] keeping the rewrite from triggering itself.

pub mod archive;
pub mod cli;
pub mod config;
pub mod logging;
pub mod payload;
pub mod watcher;

pub use archive::{PatchError, PatchReport, patch_archive};
pub use config::Settings;
pub use payload::{PayloadError, PayloadSet};
pub use watcher::{Dispatcher, SuppressionCache, WatchError, WatchRegistry};
