//! Per-turn buffering of in-flight file changes.
//!
//! A `ChangeCapture` moves through three states: idle (no buffer),
//! capturing (changes accumulate in memory), and back to idle once
//! `finalize_changes` flushes the buffer into the change log. Each logical
//! agent turn owns its own `ChangeCapture`; the buffer is never shared, so
//! interleaved turns cannot contaminate each other's pending changes.

use crate::store::VersionStore;
use crate::{diff, Result};
use rewind_types::{ChangeKind, PendingChange};
use uuid::Uuid;

/// Context-scoped buffer for the file changes of one agent turn.
#[derive(Debug, Default)]
pub struct ChangeCapture {
    /// Correlation id for log output; set while capturing.
    session_id: Option<Uuid>,
    pending: Option<Vec<PendingChange>>,
}

impl ChangeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin buffering changes. Restarting while already capturing discards
    /// the previous buffer.
    pub fn start_change_capture(&mut self) {
        if let Some(pending) = &self.pending {
            tracing::warn!(
                target: "rewind::capture",
                discarded = pending.len(),
                "capture restarted with unflushed changes"
            );
        }
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.pending = Some(Vec::new());
        tracing::debug!(target: "rewind::capture", %session_id, "change capture started");
    }

    /// Whether a capture is in progress.
    pub fn is_capturing(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of buffered changes.
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Record one file change. A silent no-op unless `start_change_capture`
    /// ran first.
    pub fn record_change(
        &mut self,
        file_path: impl Into<String>,
        kind: ChangeKind,
        before_content: Option<Vec<u8>>,
        after_content: Option<Vec<u8>>,
        diff: impl Into<String>,
    ) {
        let Some(pending) = self.pending.as_mut() else {
            tracing::debug!(target: "rewind::capture", "record_change outside a capture, ignoring");
            return;
        };
        pending.push(PendingChange {
            file_path: file_path.into(),
            kind,
            before_content,
            after_content,
            diff: diff.into(),
        });
    }

    /// Record one file change, inferring the change kind and generating the
    /// unified diff from the before/after contents.
    pub fn record_edit(
        &mut self,
        file_path: impl Into<String>,
        before_content: Option<Vec<u8>>,
        after_content: Option<Vec<u8>>,
    ) {
        let file_path = file_path.into();
        let kind = ChangeKind::infer(before_content.as_deref(), after_content.as_deref());
        let diff = diff::generate_unified_diff(
            before_content.as_deref(),
            after_content.as_deref(),
            &format!("a/{file_path}"),
            &format!("b/{file_path}"),
            3,
        );
        self.record_change(file_path, kind, before_content, after_content, diff);
    }

    /// Flush buffered changes into the log against `response_id`, returning
    /// the number of rows written.
    ///
    /// The buffer is taken out before any database work, so a failed or
    /// repeated finalize can never flush the same changes twice. An empty or
    /// absent buffer is a no-op returning 0.
    pub fn finalize_changes(&mut self, store: &VersionStore, response_id: i64) -> Result<usize> {
        let session_id = self.session_id.take();
        let Some(pending) = self.pending.take() else {
            return Ok(0);
        };
        if pending.is_empty() {
            return Ok(0);
        }

        let written = store.append_changes(response_id, &pending)?;
        tracing::info!(
            target: "rewind::capture",
            session_id = ?session_id,
            response_id,
            written,
            "changes finalized"
        );
        Ok(written)
    }
}
