use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::trace;

use crate::error::IndexError;
use crate::record::{ChangeKind, ChangeLogEntry, DeviceRow, ObjectRow, ObjectUpsert, StorageRow};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS devices (
    device_id    TEXT PRIMARY KEY,
    fingerprint  TEXT NOT NULL,
    manufacturer TEXT,
    model        TEXT,
    first_seen   INTEGER NOT NULL,
    last_seen    INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS storages (
    device_id   TEXT NOT NULL,
    storage_id  INTEGER NOT NULL,
    description TEXT NOT NULL,
    capacity    INTEGER,
    free        INTEGER,
    read_only   INTEGER NOT NULL,
    PRIMARY KEY (device_id, storage_id)
);
CREATE TABLE IF NOT EXISTS objects (
    device_id      TEXT NOT NULL,
    storage_id     INTEGER NOT NULL,
    handle         INTEGER NOT NULL,
    parent_handle  INTEGER NOT NULL,
    name           TEXT NOT NULL,
    path_key       TEXT NOT NULL,
    size           INTEGER,
    mtime          INTEGER,
    format_code    INTEGER NOT NULL,
    is_directory   INTEGER NOT NULL,
    change_counter INTEGER NOT NULL,
    generation     INTEGER NOT NULL,
    tombstone      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (device_id, storage_id, handle)
);
CREATE INDEX IF NOT EXISTS objects_parent_idx ON objects(device_id, storage_id, parent_handle);
CREATE TABLE IF NOT EXISTS change_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    change_counter INTEGER NOT NULL,
    device_id      TEXT NOT NULL,
    storage_id     INTEGER NOT NULL,
    handle         INTEGER NOT NULL,
    parent_handle  INTEGER NOT NULL,
    name           TEXT NOT NULL,
    size           INTEGER,
    mtime          INTEGER,
    format_code    INTEGER NOT NULL,
    is_directory   INTEGER NOT NULL,
    generation     INTEGER NOT NULL,
    tombstone      INTEGER NOT NULL,
    kind           TEXT NOT NULL,
    timestamp      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS change_log_device_idx ON change_log(device_id, change_counter);
CREATE TABLE IF NOT EXISTS change_counters (
    device_id TEXT PRIMARY KEY,
    current   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS crawl_state (
    device_id       TEXT NOT NULL,
    storage_id      INTEGER NOT NULL,
    parent_handle   INTEGER NOT NULL,
    last_crawled_at INTEGER NOT NULL,
    PRIMARY KEY (device_id, storage_id, parent_handle)
);
";

/// Sentinel stored in place of `NULL` for `parent_handle` columns so
/// a nullable column never appears inside a composite primary key
/// (SQLite treats every `NULL` as distinct for uniqueness purposes,
/// which would break `ON CONFLICT` upserts at the storage root).
const ROOT_PARENT: i64 = -1;

fn parent_to_sql(p: Option<u32>) -> i64 {
    p.map(|v| v as i64).unwrap_or(ROOT_PARENT)
}

fn parent_from_sql(v: i64) -> Option<u32> {
    if v == ROOT_PARENT {
        None
    } else {
        Some(v as u32)
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The persistent live index (§4.7): devices, storages, objects, and
/// their change log, behind a single connection and mutex (see
/// `mtp-journal::Journal` for the same simplification rationale).
///
/// Cheaply `Clone`: every clone shares the same connection, so an
/// `Index` can be handed to a crawl worker or a long-lived reader
/// without lifetime entanglement with the facade that opened it.
#[derive(Clone)]
pub struct Index {
    conn: Arc<Mutex<Connection>>,
}

impl Index {
    /// Open (creating if absent) the index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// An in-memory index, for tests and short-lived embeddings.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, IndexError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute_batch(SCHEMA)?;
        Ok(Index { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Record (or refresh) a device attach.
    pub fn upsert_device(
        &self,
        device_id: &str,
        fingerprint: &str,
        manufacturer: Option<&str>,
        model: Option<&str>,
    ) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        let t = now();
        conn.execute(
            "INSERT INTO devices (device_id, fingerprint, manufacturer, model, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(device_id) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                manufacturer = excluded.manufacturer,
                model = excluded.model,
                last_seen = excluded.last_seen",
            params![device_id, fingerprint, manufacturer, model, t],
        )?;
        Ok(())
    }

    /// Fetch a device row, if known.
    pub fn device(&self, device_id: &str) -> Result<Option<DeviceRow>, IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT device_id, fingerprint, manufacturer, model, first_seen, last_seen
             FROM devices WHERE device_id = ?1",
            params![device_id],
            |r| {
                Ok(DeviceRow {
                    device_id: r.get(0)?,
                    fingerprint: r.get(1)?,
                    manufacturer: r.get(2)?,
                    model: r.get(3)?,
                    first_seen: r.get(4)?,
                    last_seen: r.get(5)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Record (or refresh) one storage's reported capacity.
    pub fn upsert_storage(&self, row: &StorageRow) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO storages (device_id, storage_id, description, capacity, free, read_only)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(device_id, storage_id) DO UPDATE SET
                description = excluded.description,
                capacity = excluded.capacity,
                free = excluded.free,
                read_only = excluded.read_only",
            params![
                row.device_id,
                row.storage_id,
                row.description,
                row.capacity.map(|v| v as i64),
                row.free.map(|v| v as i64),
                row.read_only,
            ],
        )?;
        Ok(())
    }

    /// Atomically advance and return `device_id`'s change counter
    /// (§4.7 "Change counter contract").
    pub fn next_change_counter(&self, device_id: &str) -> Result<i64, IndexError> {
        let conn = self.conn.lock().unwrap();
        Self::next_change_counter_locked(&conn, device_id)
    }

    fn next_change_counter_locked(conn: &Connection, device_id: &str) -> Result<i64, IndexError> {
        conn.execute(
            "INSERT INTO change_counters (device_id, current) VALUES (?1, 1)
             ON CONFLICT(device_id) DO UPDATE SET current = current + 1",
            params![device_id],
        )?;
        let v: i64 = conn.query_row(
            "SELECT current FROM change_counters WHERE device_id = ?1",
            params![device_id],
            |r| r.get(0),
        )?;
        Ok(v)
    }

    /// The latest change counter value for `device_id`, or 0 if none
    /// has been assigned yet.
    pub fn current_change_counter(&self, device_id: &str) -> Result<i64, IndexError> {
        let conn = self.conn.lock().unwrap();
        let v: Option<i64> = conn
            .query_row(
                "SELECT current FROM change_counters WHERE device_id = ?1",
                params![device_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v.unwrap_or(0))
    }

    /// Insert or refresh one object, clearing its tombstone and
    /// stamping a fresh change counter and `generation` (§4.7 "Stale/
    /// purge sweep").
    pub fn upsert_object(
        &self,
        device_id: &str,
        row: &ObjectUpsert,
        generation: i64,
    ) -> Result<i64, IndexError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let counter = Self::next_change_counter_locked(&tx, device_id)?;
        let parent = parent_to_sql(row.parent_handle);
        tx.execute(
            "INSERT INTO objects
                (device_id, storage_id, handle, parent_handle, name, path_key, size, mtime,
                 format_code, is_directory, change_counter, generation, tombstone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)
             ON CONFLICT(device_id, storage_id, handle) DO UPDATE SET
                parent_handle = excluded.parent_handle,
                name = excluded.name,
                path_key = excluded.path_key,
                size = excluded.size,
                mtime = excluded.mtime,
                format_code = excluded.format_code,
                is_directory = excluded.is_directory,
                change_counter = excluded.change_counter,
                generation = excluded.generation,
                tombstone = 0",
            params![
                device_id,
                row.storage_id,
                row.handle,
                parent,
                row.name,
                row.path_key,
                row.size.map(|v| v as i64),
                row.mtime,
                row.format_code,
                row.is_directory,
                counter,
                generation,
            ],
        )?;
        append_change_log(
            &tx,
            device_id,
            row.storage_id,
            row.handle,
            row.parent_handle,
            &row.name,
            row.size,
            row.mtime,
            row.format_code,
            row.is_directory,
            generation,
            false,
            ChangeKind::Upserted,
            counter,
        )?;
        tx.commit()?;
        Ok(counter)
    }

    /// Delete a single object outright (e.g. an explicit `delete_object`
    /// consumer call, as opposed to a crawl-driven purge sweep).
    pub fn remove_object(&self, device_id: &str, storage_id: u32, handle: u32) -> Result<(), IndexError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        type Snapshot = (Option<u32>, String, Option<u64>, Option<i64>, u16, bool, i64, bool);
        let Some((parent_handle, name, size, mtime, format_code, is_directory, generation, tombstone)): Option<Snapshot> = tx
            .query_row(
                "SELECT parent_handle, name, size, mtime, format_code, is_directory, generation, tombstone
                 FROM objects WHERE device_id=?1 AND storage_id=?2 AND handle=?3",
                params![device_id, storage_id, handle],
                |r| {
                    Ok((
                        parent_from_sql(r.get(0)?),
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<i64>>(2)?.map(|v| v as u64),
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                        r.get(7)?,
                    ))
                },
            )
            .optional()?
        else {
            return Ok(());
        };
        let counter = Self::next_change_counter_locked(&tx, device_id)?;
        tx.execute(
            "DELETE FROM objects WHERE device_id=?1 AND storage_id=?2 AND handle=?3",
            params![device_id, storage_id, handle],
        )?;
        append_change_log(
            &tx,
            device_id,
            storage_id,
            handle,
            parent_handle,
            &name,
            size,
            mtime,
            format_code,
            is_directory,
            generation,
            tombstone,
            ChangeKind::Deleted,
            counter,
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Mark every non-tombstoned child of `(storage_id, parent_handle)`
    /// as tentatively stale, ahead of a full crawl re-upserting the
    /// ones that still exist.
    pub fn mark_stale_children(&self, device_id: &str, storage_id: u32, parent_handle: Option<u32>) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE objects SET tombstone = 1
             WHERE device_id = ?1 AND storage_id = ?2 AND parent_handle = ?3",
            params![device_id, storage_id, parent_to_sql(parent_handle)],
        )?;
        Ok(())
    }

    /// Emit a `deleted` change-log entry for every row still
    /// tombstoned under `(storage_id, parent_handle)`, then remove
    /// them (§4.7 "Net effect: exactly one change entry per real
    /// mutation").
    pub fn purge_stale(&self, device_id: &str, storage_id: u32, parent_handle: Option<u32>) -> Result<usize, IndexError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let parent = parent_to_sql(parent_handle);
        let stale: Vec<(u32, String, Option<u64>, Option<i64>, u16, bool, i64)> = {
            let mut stmt = tx.prepare(
                "SELECT handle, name, size, mtime, format_code, is_directory, generation FROM objects
                 WHERE device_id=?1 AND storage_id=?2 AND parent_handle=?3 AND tombstone=1",
            )?;
            stmt.query_map(params![device_id, storage_id, parent], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get::<_, Option<i64>>(2)?.map(|v| v as u64),
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            })?
            .collect::<Result<_, _>>()?
        };
        for (handle, name, size, mtime, format_code, is_directory, generation) in &stale {
            let counter = Self::next_change_counter_locked(&tx, device_id)?;
            append_change_log(
                &tx,
                device_id,
                storage_id,
                *handle,
                parent_handle,
                name,
                *size,
                *mtime,
                *format_code,
                *is_directory,
                *generation,
                true,
                ChangeKind::Deleted,
                counter,
            )?;
        }
        tx.execute(
            "DELETE FROM objects WHERE device_id=?1 AND storage_id=?2 AND parent_handle=?3 AND tombstone=1",
            params![device_id, storage_id, parent],
        )?;
        tx.commit()?;
        trace!(count = stale.len(), "purged stale objects");
        Ok(stale.len())
    }

    /// Find an object by handle alone, without knowing its storage
    /// (the consumer-facing `read_object`/`delete_object` operations
    /// only carry a handle; PTP handles are unique per device).
    pub fn find_object(&self, device_id: &str, handle: u32) -> Result<Option<ObjectRow>, IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT device_id, storage_id, handle, parent_handle, name, path_key, size, mtime,
                    format_code, is_directory, change_counter, generation, tombstone
             FROM objects WHERE device_id = ?1 AND handle = ?2",
            params![device_id, handle],
            row_to_object,
        )
        .optional()
        .map_err(Into::into)
    }

    /// All known storages for `device_id`.
    pub fn storages(&self, device_id: &str) -> Result<Vec<StorageRow>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT device_id, storage_id, description, capacity, free, read_only
             FROM storages WHERE device_id = ?1 ORDER BY storage_id",
        )?;
        let rows = stmt
            .query_map(params![device_id], |r| {
                Ok(StorageRow {
                    device_id: r.get(0)?,
                    storage_id: r.get(1)?,
                    description: r.get(2)?,
                    capacity: r.get::<_, Option<i64>>(3)?.map(|v| v as u64),
                    free: r.get::<_, Option<i64>>(4)?.map(|v| v as u64),
                    read_only: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Non-tombstoned children of `(storage_id, parent_handle)`,
    /// ordered by handle.
    pub fn children(&self, device_id: &str, storage_id: u32, parent_handle: Option<u32>) -> Result<Vec<ObjectRow>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT device_id, storage_id, handle, parent_handle, name, path_key, size, mtime,
                    format_code, is_directory, change_counter, generation, tombstone
             FROM objects
             WHERE device_id=?1 AND storage_id=?2 AND parent_handle=?3 AND tombstone=0
             ORDER BY handle",
        )?;
        let rows = stmt
            .query_map(params![device_id, storage_id, parent_to_sql(parent_handle)], row_to_object)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Change-log entries for `device_id` with `change_counter >
    /// anchor`, ascending.
    pub fn changes_since(&self, device_id: &str, anchor: i64) -> Result<Vec<ChangeLogEntry>, IndexError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT change_counter, device_id, storage_id, handle, parent_handle, name,
                    size, mtime, format_code, is_directory, generation, tombstone, kind, timestamp
             FROM change_log
             WHERE device_id = ?1 AND change_counter > ?2
             ORDER BY change_counter ASC",
        )?;
        let rows = stmt
            .query_map(params![device_id, anchor], |r| {
                Ok(ChangeLogEntry {
                    change_counter: r.get(0)?,
                    device_id: r.get(1)?,
                    storage_id: r.get(2)?,
                    handle: r.get(3)?,
                    parent_handle: parent_from_sql(r.get(4)?),
                    name: r.get(5)?,
                    size: r.get::<_, Option<i64>>(6)?.map(|v| v as u64),
                    mtime: r.get(7)?,
                    format_code: r.get(8)?,
                    is_directory: r.get(9)?,
                    generation: r.get(10)?,
                    tombstone: r.get(11)?,
                    kind: ChangeKind::parse(&r.get::<_, String>(12)?),
                    timestamp: r.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record that a crawl of `(storage_id, parent_handle)` just completed.
    pub fn record_crawl(&self, device_id: &str, storage_id: u32, parent_handle: Option<u32>) -> Result<(), IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO crawl_state (device_id, storage_id, parent_handle, last_crawled_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(device_id, storage_id, parent_handle) DO UPDATE SET last_crawled_at = excluded.last_crawled_at",
            params![device_id, storage_id, parent_to_sql(parent_handle), now()],
        )?;
        Ok(())
    }

    /// When `(storage_id, parent_handle)` was last crawled, if ever.
    pub fn last_crawled_at(&self, device_id: &str, storage_id: u32, parent_handle: Option<u32>) -> Result<Option<i64>, IndexError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT last_crawled_at FROM crawl_state WHERE device_id=?1 AND storage_id=?2 AND parent_handle=?3",
            params![device_id, storage_id, parent_to_sql(parent_handle)],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }
}

#[allow(clippy::too_many_arguments)]
fn append_change_log(
    conn: &Connection,
    device_id: &str,
    storage_id: u32,
    handle: u32,
    parent_handle: Option<u32>,
    name: &str,
    size: Option<u64>,
    mtime: Option<i64>,
    format_code: u16,
    is_directory: bool,
    generation: i64,
    tombstone: bool,
    kind: ChangeKind,
    counter: i64,
) -> Result<(), IndexError> {
    conn.execute(
        "INSERT INTO change_log (change_counter, device_id, storage_id, handle, parent_handle, name,
                                  size, mtime, format_code, is_directory, generation, tombstone, kind, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            counter,
            device_id,
            storage_id,
            handle,
            parent_to_sql(parent_handle),
            name,
            size.map(|v| v as i64),
            mtime,
            format_code,
            is_directory,
            generation,
            tombstone,
            kind.as_str(),
            now(),
        ],
    )?;
    Ok(())
}

fn row_to_object(r: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectRow> {
    Ok(ObjectRow {
        device_id: r.get(0)?,
        storage_id: r.get(1)?,
        handle: r.get(2)?,
        parent_handle: parent_from_sql(r.get(3)?),
        name: r.get(4)?,
        path_key: r.get(5)?,
        size: r.get::<_, Option<i64>>(6)?.map(|v| v as u64),
        mtime: r.get(7)?,
        format_code: r.get(8)?,
        is_directory: r.get(9)?,
        change_counter: r.get(10)?,
        generation: r.get(11)?,
        tombstone: r.get(12)?,
    })
}
