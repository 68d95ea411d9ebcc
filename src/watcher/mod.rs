//! Directory watching, self-write suppression and event dispatch.
//!
//! # Architecture
//!
//! ```text
//! notify::RecommendedWatcher ──mpsc──> Dispatcher
//!                                         │
//!                   ┌─────────────────────┼─────────────────────┐
//!                   │                     │                     │
//!          create(dir), recursive   close-write(*.jar)   close-write(marked)
//!                   │                     │                     │
//!           WatchRegistry::extend   InFlight token ──>      logged, skipped
//!                                   patch_archive
//!                                         │
//!                                 SuppressionCache::mark
//! ```
//!
//! The reset listener clears the [`SuppressionCache`] out of band.

mod dispatcher;
mod error;
mod inflight;
mod registry;
mod reset;
mod suppression;

pub use dispatcher::{Dispatch, Dispatcher, DispatcherBuilder};
pub use error::WatchError;
pub use inflight::{InFlight, InFlightGuard};
pub use registry::WatchRegistry;
pub use reset::spawn_reset_listener;
pub use suppression::SuppressionCache;
