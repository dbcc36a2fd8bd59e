/// A known device, as last seen by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRow {
    /// Stable device identifier (§4.8 `device_id`).
    pub device_id: String,
    /// The `"vid:pid"` fingerprint used for quirk/learned-profile lookup.
    pub fingerprint: String,
    /// Manufacturer string, if the device reported one.
    pub manufacturer: Option<String>,
    /// Model/product string, if the device reported one.
    pub model: Option<String>,
    /// Unix seconds of the first time this device was seen.
    pub first_seen: i64,
    /// Unix seconds of the most recent attach.
    pub last_seen: i64,
}

/// One storage exposed by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRow {
    /// Owning device.
    pub device_id: String,
    /// PTP storage ID.
    pub storage_id: u32,
    /// Free-text description reported by the device.
    pub description: String,
    /// Total capacity in bytes, if reported.
    pub capacity: Option<u64>,
    /// Free bytes, if reported.
    pub free: Option<u64>,
    /// Whether the device marked this storage read-only.
    pub read_only: bool,
}

/// One object (file or folder) on a device (§3 `Object`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRow {
    /// Owning device.
    pub device_id: String,
    /// Owning storage.
    pub storage_id: u32,
    /// PTP object handle.
    pub handle: u32,
    /// Parent handle; `None` means storage root.
    pub parent_handle: Option<u32>,
    /// Object name as reported by the device.
    pub name: String,
    /// Canonical, sanitized path key (no `..`, no NUL, no reserved names).
    pub path_key: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Modification time, Unix seconds, if known.
    pub mtime: Option<i64>,
    /// PTP object format code.
    pub format_code: u16,
    /// Whether this object is a container (folder/association).
    pub is_directory: bool,
    /// The change counter stamped at the last mutation of this row.
    pub change_counter: i64,
    /// The crawl generation that last touched this row.
    pub generation: i64,
    /// Set by a stale sweep; cleared by the next `upsert_object`.
    pub tombstone: bool,
}

/// The kind of mutation a `change_log` row records.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// The object was inserted or updated.
    Upserted,
    /// The object was removed (by an explicit delete or a purge sweep).
    Deleted,
}

impl ChangeKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Upserted => "upserted",
            ChangeKind::Deleted => "deleted",
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "deleted" => ChangeKind::Deleted,
            _ => ChangeKind::Upserted,
        }
    }
}

/// One `change_log` row (§3 `ChangeLogEntry`). Carries the mutated
/// object's full snapshot at the time of the change, not just its
/// identity, so a consumer can apply `changes_since(anchor)` without a
/// second query -- for a `deleted` entry this is the only place that
/// snapshot still exists, since the `objects` row itself is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry {
    /// Monotonic per-device counter value assigned to this entry.
    pub change_counter: i64,
    /// Owning device.
    pub device_id: String,
    /// Owning storage.
    pub storage_id: u32,
    /// The handle that changed.
    pub handle: u32,
    /// The parent handle at the time of the mutation.
    pub parent_handle: Option<u32>,
    /// The name at the time of the mutation.
    pub name: String,
    /// Size in bytes at the time of the mutation, if known.
    pub size: Option<u64>,
    /// Modification time at the time of the mutation, if known.
    pub mtime: Option<i64>,
    /// PTP object format code at the time of the mutation.
    pub format_code: u16,
    /// Whether the object was a container at the time of the mutation.
    pub is_directory: bool,
    /// The crawl generation in effect at the time of the mutation.
    pub generation: i64,
    /// Whether the object was tombstoned at the time of the mutation.
    pub tombstone: bool,
    /// Upserted or deleted.
    pub kind: ChangeKind,
    /// Unix seconds when the entry was appended.
    pub timestamp: i64,
}

/// Input to `upsert_object`: everything the caller knows about an
/// object after a directory crawl or a single `GetObjectInfo`.
#[derive(Debug, Clone)]
pub struct ObjectUpsert {
    /// Owning storage.
    pub storage_id: u32,
    /// PTP object handle.
    pub handle: u32,
    /// Parent handle; `None` means storage root.
    pub parent_handle: Option<u32>,
    /// Object name.
    pub name: String,
    /// Canonical path key.
    pub path_key: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Modification time, if known.
    pub mtime: Option<i64>,
    /// PTP object format code.
    pub format_code: u16,
    /// Whether this object is a container.
    pub is_directory: bool,
}
