//! SQLite persistence for prompts, responses, and the file-change log.
//!
//! One database file holds three tables: `prompts` (unique text, root of a
//! lineage), `responses` (per-prompt contiguous version numbers), and
//! `changes` (the append-only file-change log). Writes that span multiple
//! statements run inside a single IMMEDIATE transaction so version numbers
//! stay contiguous and change batches land atomically.

use crate::config::{self, StoreOptions};
use crate::Result;
use chrono::{DateTime, Utc};
use rewind_types::{
    Change, ChangeKind, PendingChange, Prompt, Response, VersionInfo, VersionListing,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// zstd level for stored file contents.
const CONTENT_COMPRESSION_LEVEL: i32 = 3;

/// SQLite-backed version store.
pub struct VersionStore {
    pub(crate) conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl VersionStore {
    /// Open or create the store, resolving the path through the configured
    /// fallback chain.
    pub fn open(options: &StoreOptions) -> Result<Self> {
        let db_path = config::resolve_db_path(options)?;
        Self::open_at(&db_path)
    }

    /// Open or create the store with default options.
    pub fn open_default() -> Result<Self> {
        Self::open(&StoreOptions::default())
    }

    /// Open or create the store at an explicit database file path.
    pub fn open_at(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;
        tracing::debug!(target: "rewind::store", path = %store.db_path.display(), "version store opened");
        Ok(store)
    }

    /// Last-resolved absolute path of the database file, for diagnostics.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt_id INTEGER NOT NULL,
                version INTEGER NOT NULL,
                output_text TEXT NOT NULL,
                parent_response_id INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (prompt_id) REFERENCES prompts(id),
                FOREIGN KEY (parent_response_id) REFERENCES responses(id),
                UNIQUE(prompt_id, version)
            );

            CREATE INDEX IF NOT EXISTS idx_responses_prompt_id
                ON responses(prompt_id);

            CREATE TABLE IF NOT EXISTS changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                response_id INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                change_kind TEXT NOT NULL,
                diff TEXT NOT NULL,
                before_content BLOB,
                after_content BLOB,
                before_hash TEXT,
                after_hash TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (response_id) REFERENCES responses(id)
            );

            CREATE INDEX IF NOT EXISTS idx_changes_response_id
                ON changes(response_id);
            CREATE INDEX IF NOT EXISTS idx_changes_file_path
                ON changes(file_path);
            "#,
        )?;
        Ok(())
    }

    // =========================================================================
    // Prompt registry
    // =========================================================================

    /// Get the id for a prompt text, inserting it if absent.
    ///
    /// Lookup is by exact text match; prompts differing by one character are
    /// distinct lineages.
    pub fn ensure_prompt(&self, text: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::ensure_prompt_in(&conn, text)?)
    }

    /// Look up a prompt by exact text without creating it.
    pub fn get_prompt(&self, text: &str) -> Result<Option<Prompt>> {
        let conn = self.conn.lock().unwrap();
        let prompt = conn
            .query_row(
                "SELECT id, text FROM prompts WHERE text = ?1",
                params![text],
                |row| {
                    Ok(Prompt {
                        id: row.get(0)?,
                        text: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(prompt)
    }

    fn ensure_prompt_in(conn: &Connection, text: &str) -> rusqlite::Result<i64> {
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM prompts WHERE text = ?1",
                params![text],
                |row| row.get(0),
            )
            .optional()?
        {
            return Ok(id);
        }
        conn.execute("INSERT INTO prompts (text) VALUES (?1)", params![text])?;
        Ok(conn.last_insert_rowid())
    }

    // =========================================================================
    // Response versioning
    // =========================================================================

    /// Record a new response for a prompt, assigning the next version number.
    ///
    /// Prompt resolution, version computation, and the insert run in one
    /// IMMEDIATE transaction, so two writers can never race to the same
    /// `(prompt_id, version)` pair. Returns `(version, response_id)`.
    pub fn add_version(
        &self,
        prompt_text: &str,
        output_text: &str,
        parent_response_id: Option<i64>,
    ) -> Result<(i64, i64)> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let prompt_id = Self::ensure_prompt_in(&tx, prompt_text)?;
        let max_version: Option<i64> = tx.query_row(
            "SELECT MAX(version) FROM responses WHERE prompt_id = ?1",
            params![prompt_id],
            |row| row.get(0),
        )?;
        let version = max_version.unwrap_or(0) + 1;

        tx.execute(
            r#"
            INSERT INTO responses (prompt_id, version, output_text, parent_response_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                prompt_id,
                version,
                output_text,
                parent_response_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let response_id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(
            target: "rewind::store",
            prompt_id,
            version,
            response_id,
            "recorded response version"
        );
        Ok((version, response_id))
    }

    /// Rewrite a response's output text in place without creating a new
    /// version. The change log is unaffected.
    pub fn update_response_output(&self, response_id: i64, output_text: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE responses SET output_text = ?1, created_at = ?2 WHERE id = ?3",
            params![output_text, Utc::now().to_rfc3339(), response_id],
        )?;
        Ok(())
    }

    /// Get a response by its globally unique id.
    pub fn get_response_by_id(&self, response_id: i64) -> Result<Option<Response>> {
        let conn = self.conn.lock().unwrap();
        let response = conn
            .query_row(
                "SELECT * FROM responses WHERE id = ?1",
                params![response_id],
                |row| Self::row_to_response(row),
            )
            .optional()?;
        Ok(response)
    }

    /// Get a response by prompt text and per-prompt version number.
    pub fn get_response_by_version(
        &self,
        prompt_text: &str,
        version: i64,
    ) -> Result<Option<Response>> {
        let conn = self.conn.lock().unwrap();
        let response = conn
            .query_row(
                r#"
                SELECT r.* FROM responses r
                JOIN prompts p ON p.id = r.prompt_id
                WHERE p.text = ?1 AND r.version = ?2
                "#,
                params![prompt_text, version],
                |row| Self::row_to_response(row),
            )
            .optional()?;
        Ok(response)
    }

    /// Get just the response id for a prompt text and version number.
    pub fn get_response_id_for_prompt_version(
        &self,
        prompt_text: &str,
        version: i64,
    ) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                r#"
                SELECT r.id FROM responses r
                JOIN prompts p ON p.id = r.prompt_id
                WHERE p.text = ?1 AND r.version = ?2
                "#,
                params![prompt_text, version],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // =========================================================================
    // Listing API
    // =========================================================================

    /// List all versions recorded for a prompt, ascending.
    pub fn list_versions(&self, prompt_text: &str) -> Result<Vec<VersionInfo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT r.id, r.version, r.created_at FROM responses r
            JOIN prompts p ON p.id = r.prompt_id
            WHERE p.text = ?1
            ORDER BY r.version ASC
            "#,
        )?;
        let versions = stmt
            .query_map(params![prompt_text], |row| {
                let created_at: String = row.get(2)?;
                Ok(VersionInfo {
                    response_id: row.get(0)?,
                    version: row.get(1)?,
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// List versions across all prompts, newest response first, optionally
    /// capped.
    pub fn list_all_versions(&self, limit: Option<u32>) -> Result<Vec<VersionListing>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT r.id, p.text, r.version, r.created_at FROM responses r
            JOIN prompts p ON p.id = r.prompt_id
            ORDER BY r.id DESC
            LIMIT ?1
            "#,
        )?;
        // A negative LIMIT disables the cap in SQLite.
        let cap = limit.map(|n| n as i64).unwrap_or(-1);
        let listings = stmt
            .query_map(params![cap], |row| {
                let created_at: String = row.get(3)?;
                Ok(VersionListing {
                    response_id: row.get(0)?,
                    prompt_text: row.get(1)?,
                    version: row.get(2)?,
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(listings)
    }

    // =========================================================================
    // Change log
    // =========================================================================

    /// Append a batch of captured changes against a response, in one
    /// transaction. Hashes are computed here over the raw contents; contents
    /// are stored zstd-compressed.
    pub(crate) fn append_changes(
        &self,
        response_id: i64,
        pending: &[PendingChange],
    ) -> Result<usize> {
        if pending.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO changes (
                    response_id, file_path, change_kind, diff, before_content,
                    after_content, before_hash, after_hash, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for change in pending {
                let before_hash = change.before_content.as_deref().map(sha256_hex);
                let after_hash = change.after_content.as_deref().map(sha256_hex);
                let before_blob = change.before_content.as_deref().map(compress).transpose()?;
                let after_blob = change.after_content.as_deref().map(compress).transpose()?;
                stmt.execute(params![
                    response_id,
                    change.file_path,
                    change.kind.as_str(),
                    change.diff,
                    before_blob,
                    after_blob,
                    before_hash,
                    after_hash,
                    Utc::now().to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(pending.len())
    }

    /// List the changes recorded against a response, in insertion order.
    pub fn get_changes_for_response_id(&self, response_id: i64) -> Result<Vec<Change>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM changes WHERE response_id = ?1 ORDER BY id ASC")?;
        let changes = stmt
            .query_map(params![response_id], |row| Self::row_to_change(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    /// List the changes for a prompt's version. Empty if the prompt or
    /// version is unknown.
    pub fn get_changes_for_version(
        &self,
        prompt_text: &str,
        version: i64,
    ) -> Result<Vec<Change>> {
        match self.get_response_id_for_prompt_version(prompt_text, version)? {
            Some(response_id) => self.get_changes_for_response_id(response_id),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Row mapping
    // =========================================================================

    fn row_to_response(row: &rusqlite::Row) -> rusqlite::Result<Response> {
        let created_at: String = row.get("created_at")?;
        Ok(Response {
            id: row.get("id")?,
            prompt_id: row.get("prompt_id")?,
            version: row.get("version")?,
            output_text: row.get("output_text")?,
            parent_response_id: row.get("parent_response_id")?,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn row_to_change(row: &rusqlite::Row) -> rusqlite::Result<Change> {
        let kind: String = row.get("change_kind")?;
        let created_at: String = row.get("created_at")?;
        let before_blob: Option<Vec<u8>> = row.get("before_content")?;
        let after_blob: Option<Vec<u8>> = row.get("after_content")?;
        Ok(Change {
            id: row.get("id")?,
            response_id: row.get("response_id")?,
            file_path: row.get("file_path")?,
            kind: kind.parse().unwrap_or(ChangeKind::Modify),
            diff: row.get("diff")?,
            before_content: before_blob.and_then(|blob| decompress(&blob).ok()),
            after_content: after_blob.and_then(|blob| decompress(&blob).ok()),
            before_hash: row.get("before_hash")?,
            after_hash: row.get("after_hash")?,
            created_at: parse_timestamp(&created_at),
        })
    }
}

/// SHA-256 hex digest of raw content.
fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn compress(content: &[u8]) -> std::io::Result<Vec<u8>> {
    zstd::encode_all(content, CONTENT_COMPRESSION_LEVEL)
}

pub(crate) fn decompress(blob: &[u8]) -> std::io::Result<Vec<u8>> {
    zstd::decode_all(blob)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn open_store(dir: &tempfile::TempDir) -> VersionStore {
        VersionStore::open_at(&dir.path().join("version_store.db")).unwrap()
    }

    #[test]
    fn test_ensure_prompt_is_get_or_create() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let first = store.ensure_prompt("add logging").unwrap();
        let second = store.ensure_prompt("add logging").unwrap();
        let other = store.ensure_prompt("add logging!").unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_get_prompt_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert!(store.get_prompt("unseen").unwrap().is_none());

        let id = store.ensure_prompt("seen").unwrap();
        let prompt = store.get_prompt("seen").unwrap().unwrap();
        assert_eq!(prompt.id, id);
        assert_eq!(prompt.text, "seen");
    }

    #[test]
    fn test_add_version_assigns_contiguous_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let (v1, r1) = store.add_version("fix bug", "first", None).unwrap();
        let (v2, r2) = store.add_version("fix bug", "second", Some(r1)).unwrap();
        let (v3, _) = store.add_version("fix bug", "third", Some(r2)).unwrap();

        assert_eq!((v1, v2, v3), (1, 2, 3));
        assert!(r2 > r1);
    }

    #[test]
    fn test_versions_are_per_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let (v1, _) = store.add_version("prompt a", "a1", None).unwrap();
        let (v2, _) = store.add_version("prompt b", "b1", None).unwrap();
        let (v3, _) = store.add_version("prompt a", "a2", None).unwrap();

        assert_eq!((v1, v2, v3), (1, 1, 2));
    }

    #[test]
    fn test_parent_response_id_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let (_, r1) = store.add_version("p", "first", None).unwrap();
        let (_, r2) = store.add_version("p", "second", Some(r1)).unwrap();

        let response = store.get_response_by_id(r2).unwrap().unwrap();
        assert_eq!(response.parent_response_id, Some(r1));

        let root = store.get_response_by_id(r1).unwrap().unwrap();
        assert_eq!(root.parent_response_id, None);
    }

    #[test]
    fn test_update_response_output_keeps_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let (_, r1) = store.add_version("p", "draft", None).unwrap();
        store.update_response_output(r1, "final").unwrap();

        let response = store.get_response_by_id(r1).unwrap().unwrap();
        assert_eq!(response.output_text, "final");
        assert_eq!(response.version, 1);
        assert_eq!(store.list_versions("p").unwrap().len(), 1);
    }

    #[test]
    fn test_get_response_by_version_returns_recorded_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.add_version("p", "one", None).unwrap();
        store.add_version("p", "two", None).unwrap();

        let response = store.get_response_by_version("p", 2).unwrap().unwrap();
        assert_eq!(response.output_text, "two");

        let id = store.get_response_id_for_prompt_version("p", 2).unwrap();
        assert_eq!(id, Some(response.id));
    }

    #[test]
    fn test_missing_reads_return_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert!(store.get_response_by_id(42).unwrap().is_none());
        assert!(store.get_response_by_version("ghost", 1).unwrap().is_none());
        assert!(store
            .get_response_id_for_prompt_version("ghost", 1)
            .unwrap()
            .is_none());
        assert!(store.list_versions("ghost").unwrap().is_empty());
        assert!(store.get_changes_for_response_id(42).unwrap().is_empty());
        assert!(store.get_changes_for_version("ghost", 1).unwrap().is_empty());
    }

    #[test]
    fn test_list_all_versions_descending_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let (_, r1) = store.add_version("p1", "a", None).unwrap();
        let (_, r2) = store.add_version("p2", "b", None).unwrap();
        let (_, r3) = store.add_version("p1", "c", None).unwrap();

        let all = store.list_all_versions(None).unwrap();
        let ids: Vec<i64> = all.iter().map(|l| l.response_id).collect();
        assert_eq!(ids, vec![r3, r2, r1]);
        assert_eq!(all[0].prompt_text, "p1");
        assert_eq!(all[0].version, 2);

        let capped = store.list_all_versions(Some(2)).unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].response_id, r3);
    }

    #[test]
    fn test_append_changes_round_trips_content_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let (_, r1) = store.add_version("p", "out", None).unwrap();

        let pending = vec![PendingChange {
            file_path: "src/main.rs".into(),
            kind: ChangeKind::Modify,
            before_content: Some(b"fn main() {}\n".to_vec()),
            after_content: Some(b"fn main() { run() }\n".to_vec()),
            diff: "-fn main() {}\n+fn main() { run() }\n".into(),
        }];
        assert_eq!(store.append_changes(r1, &pending).unwrap(), 1);

        let changes = store.get_changes_for_response_id(r1).unwrap();
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.before_content.as_deref(), Some(&b"fn main() {}\n"[..]));
        assert_eq!(
            change.after_content.as_deref(),
            Some(&b"fn main() { run() }\n"[..])
        );
        assert_eq!(
            change.before_hash.as_deref(),
            Some(sha256_hex(b"fn main() {}\n").as_str())
        );
        assert_eq!(
            change.after_hash.as_deref(),
            Some(sha256_hex(b"fn main() { run() }\n").as_str())
        );
    }

    #[test]
    fn test_null_content_has_null_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let (_, r1) = store.add_version("p", "out", None).unwrap();

        let pending = vec![PendingChange {
            file_path: "gone.txt".into(),
            kind: ChangeKind::Delete,
            before_content: Some(b"bye".to_vec()),
            after_content: None,
            diff: "-bye\n".into(),
        }];
        store.append_changes(r1, &pending).unwrap();

        let change = &store.get_changes_for_response_id(r1).unwrap()[0];
        assert!(change.after_content.is_none());
        assert!(change.after_hash.is_none());
        assert!(change.before_hash.is_some());
    }

    proptest! {
        #[test]
        fn prop_versions_stay_contiguous(outputs in proptest::collection::vec(".{0,40}", 1..8)) {
            let dir = tempfile::tempdir().unwrap();
            let store = open_store(&dir);

            for (i, output) in outputs.iter().enumerate() {
                let (version, _) = store.add_version("prompt", output, None).unwrap();
                prop_assert_eq!(version, i as i64 + 1);
            }

            let versions = store.list_versions("prompt").unwrap();
            prop_assert_eq!(versions.len(), outputs.len());
            for (i, info) in versions.iter().enumerate() {
                prop_assert_eq!(info.version, i as i64 + 1);
            }

            for (i, output) in outputs.iter().enumerate() {
                let response = store
                    .get_response_by_version("prompt", i as i64 + 1)
                    .unwrap()
                    .unwrap();
                prop_assert_eq!(&response.output_text, output);
            }
        }
    }
}
