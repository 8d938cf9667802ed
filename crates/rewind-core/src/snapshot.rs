//! Point-in-time reconstruction of tracked file state.
//!
//! Reconstruction replays the append-only change log up to a response
//! cutoff and materializes a per-file "current value": for each file ever
//! touched, the most recent change at or before the cutoff wins. Ordering
//! is by monotonic response id and then change-row id, never wall-clock
//! time.

use crate::store::{self, VersionStore};
use crate::Result;
use rewind_types::SnapshotEntry;
use rusqlite::{params, OptionalExtension};

impl VersionStore {
    /// Reconstruct the content of every tracked file as of the given
    /// response cutoff.
    ///
    /// Every file path that appears anywhere in the change log is
    /// enumerated. A file with no change at or before the cutoff, or whose
    /// visible change is a delete, is reported with `content = None`.
    /// Contents are decoded lossily; undecodable bytes are replaced.
    pub fn compute_snapshot_as_of_response_id(
        &self,
        cutoff_response_id: i64,
    ) -> Result<Vec<SnapshotEntry>> {
        let conn = self.conn.lock().unwrap();

        let mut paths_stmt =
            conn.prepare("SELECT DISTINCT file_path FROM changes ORDER BY file_path ASC")?;
        let tracked = paths_stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Last writer wins: the change with the highest (response_id, id)
        // at or before the cutoff decides the file's content.
        let mut visible_stmt = conn.prepare(
            r#"
            SELECT after_content FROM changes
            WHERE file_path = ?1 AND response_id <= ?2
            ORDER BY response_id DESC, id DESC
            LIMIT 1
            "#,
        )?;

        let mut entries = Vec::with_capacity(tracked.len());
        for file_path in tracked {
            let visible: Option<Option<Vec<u8>>> = visible_stmt
                .query_row(params![file_path, cutoff_response_id], |row| row.get(0))
                .optional()?;
            let content = match visible {
                // Only touched after the cutoff: the file does not exist yet.
                None => None,
                // A delete stores no after content.
                Some(None) => None,
                Some(Some(blob)) => store::decompress(&blob)
                    .ok()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            };
            entries.push(SnapshotEntry { file_path, content });
        }

        tracing::debug!(
            target: "rewind::snapshot",
            cutoff_response_id,
            files = entries.len(),
            "snapshot reconstructed"
        );
        Ok(entries)
    }
}
