//! In-place patching of ZIP/JAR archives.
//!
//! # Flow
//!
//! ```text
//! app.jar ──read──> ArchiveSnapshot ──write──> .app.jar.XXXX.swp
//!                        │                            │
//!                  override / copy              mark suppression
//!                                                     │
//!                                           rename over app.jar
//! ```
//!
//! Entries named in the payload get the payload bytes under the original
//! entry's metadata, every other entry is copied without recompression, and
//! payload entries the archive lacked are appended at the end.

mod directory;
mod error;
mod patch;

pub use error::PatchError;
pub use patch::{PatchReport, patch_archive};
