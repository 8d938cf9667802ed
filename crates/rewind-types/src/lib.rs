//! Shared data types for the rewind versioning engine.

mod change;
mod version;

pub use change::{Change, ChangeKind, PendingChange, SnapshotEntry};
pub use version::{Prompt, Response, VersionInfo, VersionListing};
