use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::JournalError;
use crate::record::{
    from_unix_secs, unix_secs, ReconcileOutcome, TransferId, TransferKind, TransferRecord,
    TransferState,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transfers (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id        TEXT NOT NULL,
    kind             TEXT NOT NULL,
    handle           INTEGER,
    parent_handle    INTEGER,
    name             TEXT NOT NULL,
    total_bytes      INTEGER,
    committed_bytes  INTEGER NOT NULL DEFAULT 0,
    supports_partial INTEGER NOT NULL,
    local_temp_url   TEXT NOT NULL,
    final_url        TEXT,
    source_path      TEXT,
    etag             TEXT,
    state            TEXT NOT NULL,
    remote_handle    INTEGER,
    content_hash     TEXT,
    throughput_mb_s  REAL,
    last_error       TEXT,
    updated_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS transfers_device_idx ON transfers(device_id);
";

/// The durable transfer journal (§4.6). Backed by a single SQLite
/// connection behind a mutex -- this workspace has one writer and
/// treats reads as cheap enough not to need a connection pool.
///
/// Cheaply `Clone`: every clone shares the same connection, so an
/// in-flight [`crate::TransferId`] tracker (e.g. an `ObjectReader`)
/// can hold its own handle alongside the facade's.
#[derive(Clone)]
pub struct Journal {
    conn: Arc<Mutex<Connection>>,
}

impl Journal {
    /// Open (creating if absent) the journal database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// An in-memory journal, for tests and short-lived embeddings.
    pub fn open_in_memory() -> Result<Self, JournalError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, JournalError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute_batch(SCHEMA)?;
        Ok(Journal { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Begin a read (device -> local) transfer; returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_read(
        &self,
        device_id: &str,
        handle: u32,
        name: &str,
        size: Option<u64>,
        supports_partial: bool,
        temp_path: &str,
        final_path: Option<&str>,
        etag: Option<&str>,
    ) -> Result<TransferId, JournalError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO transfers
                (device_id, kind, handle, name, total_bytes, committed_bytes,
                 supports_partial, local_temp_url, final_url, etag, state, updated_at)
             VALUES (?1, 'read', ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, 'started', ?9)",
            params![
                device_id,
                handle,
                name,
                size.map(|s| s as i64),
                supports_partial,
                temp_path,
                final_path,
                etag,
                unix_secs(SystemTime::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Begin a write (local -> device) transfer; returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_write(
        &self,
        device_id: &str,
        parent: Option<u32>,
        name: &str,
        size: u64,
        supports_partial: bool,
        temp_path: &str,
        source_path: Option<&str>,
    ) -> Result<TransferId, JournalError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO transfers
                (device_id, kind, parent_handle, name, total_bytes, committed_bytes,
                 supports_partial, local_temp_url, source_path, state, updated_at)
             VALUES (?1, 'write', ?2, ?3, ?4, 0, ?5, ?6, ?7, 'started', ?8)",
            params![
                device_id,
                parent,
                name,
                size as i64,
                supports_partial,
                temp_path,
                source_path,
                unix_secs(SystemTime::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record newly committed progress, advancing `started -> in_progress`
    /// the first time it is called.
    pub fn update_progress(&self, id: TransferId, committed_bytes: u64) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        let row = load_one(&conn, id)?;
        if let Some(total) = row.total_bytes {
            if committed_bytes > total {
                return Err(JournalError::ProgressExceedsTotal {
                    id,
                    committed: committed_bytes,
                    total,
                });
            }
        }
        let next_state = if row.state == TransferState::Started {
            TransferState::InProgress
        } else {
            row.state
        };
        conn.execute(
            "UPDATE transfers SET committed_bytes = ?1, state = ?2, updated_at = ?3 WHERE id = ?4",
            params![committed_bytes as i64, next_state.as_str(), unix_secs(SystemTime::now()), id],
        )?;
        Ok(())
    }

    /// Record the device-assigned handle for a write, once known.
    pub fn record_remote_handle(&self, id: TransferId, handle: u32) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        touch(&conn, id, "remote_handle", handle)
    }

    /// Record the computed content hash for a finished transfer.
    pub fn record_content_hash(&self, id: TransferId, hex: &str) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        touch(&conn, id, "content_hash", hex)
    }

    /// Record a fresh throughput sample, in MB/s.
    pub fn update_throughput(&self, id: TransferId, mb_per_s: f64) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        touch(&conn, id, "throughput_mb_s", mb_per_s)
    }

    /// Mark a transfer done; it leaves the resumable set.
    pub fn complete(&self, id: TransferId) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        transition(&conn, id, TransferState::Done, None)
    }

    /// Mark a transfer failed, recording `error` for diagnostics.
    pub fn fail(&self, id: TransferId, error: &str) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        transition(&conn, id, TransferState::Failed, Some(error))
    }

    /// Pause a transfer so it can later resume with `in_progress`.
    pub fn pause(&self, id: TransferId) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        transition(&conn, id, TransferState::Paused, None)
    }

    /// Resume a paused transfer.
    pub fn resume(&self, id: TransferId) -> Result<(), JournalError> {
        let conn = self.conn.lock().unwrap();
        transition(&conn, id, TransferState::InProgress, None)
    }

    /// All resumable records for `device_id` (§4.6 `load_resumables`).
    pub fn load_resumables(&self, device_id: &str) -> Result<Vec<TransferRecord>, JournalError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM transfers WHERE device_id = ?1
             AND state IN ('started', 'in_progress', 'paused')
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![device_id], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete non-resumable-success records (everything but `done`)
    /// whose last update is older than `older_than`, returning the
    /// local temp paths they left behind so the caller can unlink
    /// them. The journal does not touch the filesystem itself.
    pub fn clear_stale_temps(&self, older_than: Duration) -> Result<Vec<String>, JournalError> {
        let conn = self.conn.lock().unwrap();
        let cutoff = unix_secs(SystemTime::now()) - older_than.as_secs() as i64;
        let mut stmt = conn.prepare(
            "SELECT local_temp_url FROM transfers WHERE state != 'done' AND updated_at < ?1",
        )?;
        let paths = stmt
            .query_map(params![cutoff], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        conn.execute(
            "DELETE FROM transfers WHERE state != 'done' AND updated_at < ?1",
            params![cutoff],
        )?;
        debug!(count = paths.len(), "cleared stale journal temps");
        Ok(paths)
    }

    /// Fetch a single record by id.
    pub fn get(&self, id: TransferId) -> Result<TransferRecord, JournalError> {
        let conn = self.conn.lock().unwrap();
        load_one(&conn, id)
    }

    /// Reconcile a resumable write against the size the device reports
    /// for its `remote_handle` (§4.6 "Reconcile-on-reconnect protocol").
    /// The caller is responsible for issuing `get_object_info` and
    /// passing back what it learned; the journal only owns the
    /// resulting state change.
    pub fn reconcile_write(
        &self,
        id: TransferId,
        remote_size: u64,
        total_bytes: u64,
    ) -> Result<ReconcileOutcome, JournalError> {
        let conn = self.conn.lock().unwrap();
        if remote_size >= total_bytes {
            transition(&conn, id, TransferState::Done, None)?;
            return Ok(ReconcileOutcome::AlreadyComplete);
        }
        conn.execute(
            "UPDATE transfers
             SET committed_bytes = 0, remote_handle = NULL, state = 'in_progress', updated_at = ?1
             WHERE id = ?2",
            params![unix_secs(SystemTime::now()), id],
        )?;
        Ok(ReconcileOutcome::Restarted)
    }

    /// Reconcile a resumable read against whether the local temp file's
    /// `etag` still matches what was recorded at `begin_read`.
    pub fn reconcile_read(&self, id: TransferId, etag_matches: bool) -> Result<ReconcileOutcome, JournalError> {
        if etag_matches {
            return Ok(ReconcileOutcome::Unchanged);
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE transfers SET committed_bytes = 0, state = 'started', updated_at = ?1 WHERE id = ?2",
            params![unix_secs(SystemTime::now()), id],
        )?;
        Ok(ReconcileOutcome::Restarted)
    }
}

fn transition(
    conn: &Connection,
    id: TransferId,
    next: TransferState,
    error: Option<&str>,
) -> Result<(), JournalError> {
    let row = load_one(conn, id)?;
    if !row.state.can_transition_to(next) {
        return Err(JournalError::IllegalTransition { id });
    }
    conn.execute(
        "UPDATE transfers SET state = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
        params![next.as_str(), error, unix_secs(SystemTime::now()), id],
    )?;
    Ok(())
}

fn touch<T: rusqlite::ToSql>(conn: &Connection, id: TransferId, column: &str, value: T) -> Result<(), JournalError> {
    load_one(conn, id)?;
    let sql = format!("UPDATE transfers SET {column} = ?1, updated_at = ?2 WHERE id = ?3");
    conn.execute(&sql, params![value, unix_secs(SystemTime::now()), id])?;
    Ok(())
}

fn load_one(conn: &Connection, id: TransferId) -> Result<TransferRecord, JournalError> {
    conn.query_row("SELECT * FROM transfers WHERE id = ?1", params![id], row_to_record)
        .optional()?
        .ok_or(JournalError::NotFound(id))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransferRecord> {
    Ok(TransferRecord {
        id: row.get("id")?,
        device_id: row.get("device_id")?,
        kind: TransferKind::parse(&row.get::<_, String>("kind")?),
        handle: row.get::<_, Option<i64>>("handle")?.map(|v| v as u32),
        parent_handle: row.get::<_, Option<i64>>("parent_handle")?.map(|v| v as u32),
        name: row.get("name")?,
        total_bytes: row.get::<_, Option<i64>>("total_bytes")?.map(|v| v as u64),
        committed_bytes: row.get::<_, i64>("committed_bytes")? as u64,
        supports_partial: row.get("supports_partial")?,
        local_temp_url: row.get("local_temp_url")?,
        final_url: row.get("final_url")?,
        source_path: row.get("source_path")?,
        etag: row.get("etag")?,
        state: TransferState::parse(&row.get::<_, String>("state")?),
        remote_handle: row.get::<_, Option<i64>>("remote_handle")?.map(|v| v as u32),
        content_hash: row.get("content_hash")?,
        throughput_mb_s: row.get("throughput_mb_s")?,
        last_error: row.get("last_error")?,
        updated_at: from_unix_secs(row.get("updated_at")?),
    })
}
