//! Prompt and response versioning types.
//!
//! A prompt is the root of a version lineage; each completed agent turn
//! against it becomes a response with a per-prompt version number and a
//! globally unique, monotonically increasing id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored natural-language prompt. Immutable once created; identity is
/// assigned on first insertion and looked up by exact text match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: i64,
    pub text: String,
}

/// One completed agent turn's output for a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Globally unique, monotonically increasing id.
    pub id: i64,
    /// Prompt this response belongs to.
    pub prompt_id: i64,
    /// Per-prompt version number (1, 2, 3, ...).
    pub version: i64,
    /// The agent's output text for this turn.
    pub output_text: String,
    /// Response this turn was built on top of, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_response_id: Option<i64>,
    /// When the response was recorded (updated if the output is rewritten).
    pub created_at: DateTime<Utc>,
}

/// One row of a per-prompt version listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub response_id: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// One row of a cross-prompt version listing, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionListing {
    pub response_id: i64,
    /// Prompt text, carried for display in listings.
    pub prompt_text: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}
