//! Durable operation and transaction store backed by a single SQLite file.
//!
//! All writes funnel through one connection guarded by a mutex; the database
//! runs in WAL mode so a crash mid-write never corrupts committed records and
//! other connections can read while a write is in flight.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{
    NewOperation, OpKind, Operation, OperationId, OperationStatus, Transaction, TxStatus,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    ts TEXT NOT NULL,
    source_path TEXT NOT NULL,
    destination_path TEXT,
    content_hash TEXT,
    size_bytes INTEGER,
    mode INTEGER,
    modified_at TEXT,
    extra TEXT,
    transaction_id TEXT REFERENCES transactions(id),
    status TEXT NOT NULL,
    error TEXT,
    reverts INTEGER REFERENCES operations(id),
    replays INTEGER REFERENCES operations(id)
);

CREATE INDEX IF NOT EXISTS idx_operations_ts ON operations(ts);
CREATE INDEX IF NOT EXISTS idx_operations_txn ON operations(transaction_id);
CREATE INDEX IF NOT EXISTS idx_operations_kind ON operations(kind);
CREATE INDEX IF NOT EXISTS idx_operations_status ON operations(status);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    operation_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Filters for `Store::list` and the history CLI.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<OpKind>,
    pub status: Option<OperationStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
    /// Substring match against source or destination path.
    pub path_contains: Option<String>,
    pub limit: Option<usize>,
}

pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if necessary) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-statement; the
        // connection itself is still structurally sound.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist an operation record, returning its store-assigned id.
    pub fn append(&self, op: &NewOperation) -> Result<OperationId> {
        let conn = self.conn();
        let extra = if op.metadata.extra.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&op.metadata.extra)?)
        };
        conn.execute(
            "INSERT INTO operations (kind, ts, source_path, destination_path, content_hash,
                 size_bytes, mode, modified_at, extra, transaction_id, status, error, reverts, replays)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                op.kind.to_string(),
                Utc::now(),
                path_text(&op.source_path),
                op.destination_path.as_deref().map(path_text),
                op.content_hash,
                op.metadata.size.map(|s| s as i64),
                op.metadata.mode,
                op.metadata.modified_at,
                extra,
                op.transaction_id.map(|id| id.to_string()),
                op.status.to_string(),
                op.error,
                op.reverts,
                op.replays,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Persist a transaction envelope.
    pub fn append_transaction(&self, tx: &Transaction) -> Result<()> {
        self.conn().execute(
            "INSERT INTO transactions (id, started_at, completed_at, operation_count, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tx.id.to_string(),
                tx.started_at,
                tx.completed_at,
                tx.operation_count,
                tx.status.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: OperationId) -> Result<Option<Operation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM operations WHERE id = ?1")?;
        let op = stmt.query_row(params![id], row_to_operation).optional()?;
        Ok(op)
    }

    pub fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM transactions WHERE id = ?1")?;
        let tx = stmt
            .query_row(params![id.to_string()], row_to_transaction)
            .optional()?;
        Ok(tx)
    }

    /// Filtered history listing, newest first.
    pub fn list(&self, filter: &HistoryFilter) -> Result<Vec<Operation>> {
        let mut sql = String::from("SELECT * FROM operations WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(kind) = filter.kind {
            sql.push_str(&format!(" AND kind = ?{}", args.len() + 1));
            args.push(Box::new(kind.to_string()));
        }
        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
            args.push(Box::new(status.to_string()));
        }
        if let Some(since) = filter.since {
            sql.push_str(&format!(" AND ts >= ?{}", args.len() + 1));
            args.push(Box::new(since));
        }
        if let Some(until) = filter.until {
            sql.push_str(&format!(" AND ts <= ?{}", args.len() + 1));
            args.push(Box::new(until));
        }
        if let Some(txn) = filter.transaction_id {
            sql.push_str(&format!(" AND transaction_id = ?{}", args.len() + 1));
            args.push(Box::new(txn.to_string()));
        }
        if let Some(needle) = &filter.path_contains {
            let n = args.len() + 1;
            sql.push_str(&format!(
                " AND (source_path LIKE ?{n} OR destination_path LIKE ?{n})"
            ));
            args.push(Box::new(format!("%{needle}%")));
        }
        sql.push_str(" ORDER BY id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            row_to_operation,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn update_status(
        &self,
        id: OperationId,
        status: OperationStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE operations SET status = ?1, error = ?2 WHERE id = ?3",
            params![status.to_string(), error, id],
        )?;
        if changed == 0 {
            return Err(EngineError::OperationNotFound { id });
        }
        Ok(())
    }

    pub fn update_transaction_status(
        &self,
        id: Uuid,
        status: TxStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE transactions SET status = ?1, completed_at = COALESCE(?2, completed_at)
             WHERE id = ?3",
            params![status.to_string(), completed_at, id.to_string()],
        )?;
        if changed == 0 {
            return Err(EngineError::TransactionNotFound { id });
        }
        Ok(())
    }

    pub fn increment_transaction_count(&self, id: Uuid) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE transactions SET operation_count = operation_count + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if changed == 0 {
            return Err(EngineError::TransactionNotFound { id });
        }
        Ok(())
    }

    /// Member operations of a transaction in chronological (id) order.
    pub fn operations_in_transaction(&self, id: Uuid) -> Result<Vec<Operation>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT * FROM operations WHERE transaction_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![id.to_string()], row_to_operation)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The undo stack: newest-first organic Completed records, excluding
    /// members of in-progress or failed transactions, truncated at `depth`.
    pub fn undo_candidates(&self, depth: usize) -> Result<Vec<Operation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT o.* FROM operations o
             LEFT JOIN transactions t ON o.transaction_id = t.id
             WHERE o.status = 'completed'
               AND o.reverts IS NULL AND o.replays IS NULL
               AND (t.id IS NULL OR t.status IN ('committed', 'partially_rolled_back'))
             ORDER BY o.id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![depth as i64], row_to_operation)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The redo stack: rolled-back records whose reversal happened after the
    /// newest organic record. Recording anything new therefore empties this
    /// view without any stack bookkeeping.
    pub fn redo_candidates(&self) -> Result<Vec<Operation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT o.*, MAX(r.id) AS reversal_id FROM operations o
             JOIN operations r ON r.reverts = o.id
             WHERE o.status = 'rolled_back'
               AND o.reverts IS NULL AND o.replays IS NULL
             GROUP BY o.id
             HAVING MAX(r.id) > COALESCE((SELECT MAX(id) FROM operations
                                          WHERE reverts IS NULL AND replays IS NULL), 0)
             ORDER BY reversal_id DESC",
        )?;
        let rows = stmt.query_map([], row_to_operation)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The most recent organic Completed operation after `after_id` that
    /// touched `path` on either side. Used by the validator's conflict check.
    pub fn later_operation_touching(
        &self,
        path: &Path,
        after_id: OperationId,
    ) -> Result<Option<OperationId>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM operations
             WHERE id > ?1 AND status = 'completed'
               AND reverts IS NULL AND replays IS NULL
               AND (source_path = ?2 OR destination_path = ?2)
             ORDER BY id ASC LIMIT 1",
        )?;
        let id = stmt
            .query_row(params![after_id, path_text(path)], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Transactions still marked in-progress; resolved by the startup scan.
    pub fn in_progress_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT * FROM transactions WHERE status = 'in_progress' ORDER BY started_at")?;
        let rows = stmt.query_map([], row_to_transaction)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Delete operation records older than `cutoff`, sparing members of
    /// in-progress transactions. Returns the number of rows removed.
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM operations
             WHERE ts < ?1
               AND (transaction_id IS NULL OR transaction_id NOT IN
                    (SELECT id FROM transactions WHERE status = 'in_progress'))",
            params![cutoff],
        )?;
        Ok(removed)
    }

    /// Trim the log to at most `max_count` rows, dropping the oldest first
    /// and sparing members of in-progress transactions.
    pub fn delete_overflow(&self, max_count: usize) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM operations WHERE id IN (
                 SELECT id FROM operations
                 WHERE transaction_id IS NULL OR transaction_id NOT IN
                       (SELECT id FROM transactions WHERE status = 'in_progress')
                 ORDER BY id DESC LIMIT -1 OFFSET ?1
             )",
            params![max_count as i64],
        )?;
        Ok(removed)
    }

    /// Drop transaction envelopes whose members were all cleaned up.
    pub fn delete_empty_transactions(&self) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM transactions
             WHERE status != 'in_progress'
               AND id NOT IN (SELECT DISTINCT transaction_id FROM operations
                              WHERE transaction_id IS NOT NULL)",
            [],
        )?;
        Ok(removed)
    }

    pub fn count_operations(&self) -> Result<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// On-disk size of the database file, zero for in-memory stores.
    pub fn size_bytes(&self) -> Result<u64> {
        match &self.path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }

    pub fn vacuum(&self) -> Result<()> {
        self.conn().execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Merge one key/value pair into an operation's free-form metadata.
    /// Used when a redone Delete acquires a fresh holding-area location.
    pub fn update_extra(&self, id: OperationId, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        let extra: Option<String> = conn
            .query_row(
                "SELECT extra FROM operations WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(EngineError::OperationNotFound { id })?;
        let mut map: std::collections::BTreeMap<String, String> = match extra {
            Some(json) => serde_json::from_str(&json)?,
            None => Default::default(),
        };
        map.insert(key.to_string(), value.to_string());
        conn.execute(
            "UPDATE operations SET extra = ?1 WHERE id = ?2",
            params![serde_json::to_string(&map)?, id],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
        let value = stmt
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn parse_err(err: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, err.into())
}

fn row_to_operation(row: &Row<'_>) -> rusqlite::Result<Operation> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    let txn: Option<String> = row.get("transaction_id")?;
    let extra: Option<String> = row.get("extra")?;
    let source: String = row.get("source_path")?;
    let destination: Option<String> = row.get("destination_path")?;
    let size: Option<i64> = row.get("size_bytes")?;

    Ok(Operation {
        id: row.get("id")?,
        kind: kind.parse().map_err(parse_err)?,
        timestamp: row.get("ts")?,
        source_path: PathBuf::from(source),
        destination_path: destination.map(PathBuf::from),
        content_hash: row.get("content_hash")?,
        metadata: crate::model::FileMetadata {
            size: size.map(|s| s as u64),
            mode: row.get("mode")?,
            modified_at: row.get("modified_at")?,
            extra: match extra {
                Some(json) => serde_json::from_str(&json)
                    .map_err(|e| parse_err(format!("invalid metadata json: {e}")))?,
                None => Default::default(),
            },
        },
        transaction_id: match txn {
            Some(text) => Some(
                text.parse()
                    .map_err(|e| parse_err(format!("invalid transaction id: {e}")))?,
            ),
            None => None,
        },
        status: status.parse().map_err(parse_err)?,
        error: row.get("error")?,
        reverts: row.get("reverts")?,
        replays: row.get("replays")?,
    })
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    Ok(Transaction {
        id: id
            .parse()
            .map_err(|e| parse_err(format!("invalid transaction id: {e}")))?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        operation_count: row.get("operation_count")?,
        status: status.parse().map_err(parse_err)?,
    })
}

// Needed for rusqlite optional query results
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileMetadata;

    fn sample(kind: OpKind, src: &str, dst: Option<&str>) -> NewOperation {
        NewOperation::completed(
            kind,
            PathBuf::from(src),
            dst.map(PathBuf::from),
            Some("ab".repeat(32)),
            FileMetadata::default(),
        )
    }

    #[test]
    fn append_assigns_monotonic_ids() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .append(&sample(OpKind::Move, "/a", Some("/b")))
            .unwrap();
        let b = store
            .append(&sample(OpKind::Copy, "/c", Some("/d")))
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn get_round_trips_all_fields() {
        let store = Store::open_in_memory().unwrap();
        let mut op = sample(OpKind::Move, "/src/a.txt", Some("/dst/a.txt"));
        op.metadata.size = Some(42);
        op.metadata.mode = Some(0o644);
        op.metadata
            .extra
            .insert("origin".to_string(), "classifier".to_string());
        let id = store.append(&op).unwrap();

        let got = store.get(id).unwrap().unwrap();
        assert_eq!(got.kind, OpKind::Move);
        assert_eq!(got.source_path, PathBuf::from("/src/a.txt"));
        assert_eq!(got.destination_path, Some(PathBuf::from("/dst/a.txt")));
        assert_eq!(got.metadata.size, Some(42));
        assert_eq!(got.metadata.mode, Some(0o644));
        assert_eq!(got.metadata.extra.get("origin").unwrap(), "classifier");
        assert_eq!(got.status, OperationStatus::Completed);
        assert!(got.is_organic());
    }

    #[test]
    fn list_filters_by_kind_and_path() {
        let store = Store::open_in_memory().unwrap();
        store
            .append(&sample(OpKind::Move, "/docs/report.pdf", Some("/sorted/report.pdf")))
            .unwrap();
        store
            .append(&sample(OpKind::Copy, "/docs/photo.jpg", Some("/sorted/photo.jpg")))
            .unwrap();

        let moves = store
            .list(&HistoryFilter {
                kind: Some(OpKind::Move),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].kind, OpKind::Move);

        let photos = store
            .list(&HistoryFilter {
                path_contains: Some("photo".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].kind, OpKind::Copy);
    }

    #[test]
    fn undo_candidates_skip_audit_and_rolled_back_rows() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .append(&sample(OpKind::Move, "/a", Some("/b")))
            .unwrap();
        let b = store
            .append(&sample(OpKind::Move, "/c", Some("/d")))
            .unwrap();

        // Reverse b: audit row plus status flip.
        let mut reversal = sample(OpKind::Move, "/d", Some("/c"));
        reversal.reverts = Some(b);
        store.append(&reversal).unwrap();
        store
            .update_status(b, OperationStatus::RolledBack, None)
            .unwrap();

        let undo = store.undo_candidates(100).unwrap();
        assert_eq!(undo.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn redo_candidates_cleared_by_new_organic_record() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .append(&sample(OpKind::Move, "/a", Some("/b")))
            .unwrap();
        let mut reversal = sample(OpKind::Move, "/b", Some("/a"));
        reversal.reverts = Some(a);
        store.append(&reversal).unwrap();
        store
            .update_status(a, OperationStatus::RolledBack, None)
            .unwrap();

        let redo = store.redo_candidates().unwrap();
        assert_eq!(redo.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a]);

        // Fresh activity invalidates the redo view.
        store
            .append(&sample(OpKind::Copy, "/x", Some("/y")))
            .unwrap();
        assert!(store.redo_candidates().unwrap().is_empty());
    }

    #[test]
    fn undo_candidates_respect_depth_bound() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .append(&sample(OpKind::Move, &format!("/s{i}"), Some("/d")))
                .unwrap();
        }
        assert_eq!(store.undo_candidates(3).unwrap().len(), 3);
    }

    #[test]
    fn in_progress_members_excluded_from_undo() {
        let store = Store::open_in_memory().unwrap();
        let tx = Transaction::begin();
        store.append_transaction(&tx).unwrap();

        let mut op = sample(OpKind::Move, "/a", Some("/b"));
        op.transaction_id = Some(tx.id);
        store.append(&op).unwrap();

        assert!(store.undo_candidates(10).unwrap().is_empty());

        store
            .update_transaction_status(tx.id, TxStatus::Committed, Some(Utc::now()))
            .unwrap();
        assert_eq!(store.undo_candidates(10).unwrap().len(), 1);
    }

    #[test]
    fn delete_older_than_spares_in_progress_members() {
        let store = Store::open_in_memory().unwrap();
        let tx = Transaction::begin();
        store.append_transaction(&tx).unwrap();

        let mut member = sample(OpKind::Move, "/a", Some("/b"));
        member.transaction_id = Some(tx.id);
        store.append(&member).unwrap();
        store
            .append(&sample(OpKind::Copy, "/c", Some("/d")))
            .unwrap();

        let removed = store
            .delete_older_than(Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_operations().unwrap(), 1);
    }

    #[test]
    fn delete_overflow_keeps_newest() {
        let store = Store::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(
                store
                    .append(&sample(OpKind::Move, &format!("/s{i}"), Some("/d")))
                    .unwrap(),
            );
        }
        let removed = store.delete_overflow(2).unwrap();
        assert_eq!(removed, 4);
        assert!(store.get(ids[5]).unwrap().is_some());
        assert!(store.get(ids[0]).unwrap().is_none());
    }

    #[test]
    fn meta_upserts() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_meta("last_cleanup_at").unwrap().is_none());
        store.set_meta("last_cleanup_at", "x").unwrap();
        store.set_meta("last_cleanup_at", "y").unwrap();
        assert_eq!(store.get_meta("last_cleanup_at").unwrap().unwrap(), "y");
    }
}
