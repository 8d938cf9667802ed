//! File change records and snapshot entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of file mutation recorded against a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// File was created.
    Create,
    /// File content was modified.
    Modify,
    /// File was deleted.
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
        }
    }

    /// Infer the kind from before/after content presence.
    pub fn infer(before: Option<&[u8]>, after: Option<&[u8]>) -> Self {
        match (before.is_some(), after.is_some()) {
            (false, true) => ChangeKind::Create,
            (true, false) => ChangeKind::Delete,
            _ => ChangeKind::Modify,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeKind::Create),
            "modify" => Ok(ChangeKind::Modify),
            "delete" => Ok(ChangeKind::Delete),
            _ => Err(format!("Invalid change kind: '{}'", s)),
        }
    }
}

/// A durable change-log row. Append-only: never updated or deleted once
/// written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: i64,
    /// Response this change was finalized against.
    pub response_id: i64,
    pub file_path: String,
    pub kind: ChangeKind,
    /// Human-readable diff of the change.
    pub diff: String,
    /// Content before the change (None for created files).
    pub before_content: Option<Vec<u8>>,
    /// Content after the change (None for deleted files).
    pub after_content: Option<Vec<u8>>,
    /// SHA-256 hex digest of `before_content` (None if content is None).
    pub before_hash: Option<String>,
    /// SHA-256 hex digest of `after_content` (None if content is None).
    pub after_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A buffered, not-yet-durable change owned by a single capture context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub file_path: String,
    pub kind: ChangeKind,
    pub before_content: Option<Vec<u8>>,
    pub after_content: Option<Vec<u8>>,
    pub diff: String,
}

/// Reconstructed state of one tracked file as of a response cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub file_path: String,
    /// `None` when the file did not exist yet, or was deleted, at the cutoff.
    pub content: Option<String>,
}
