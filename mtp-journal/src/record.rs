use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Opaque journal row identifier (§3 `TransferRecord.id`).
pub type TransferId = i64;

/// Whether a journal entry tracks an inbound or outbound transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferKind {
    /// Reading an object off the device onto local storage.
    Read,
    /// Writing a local file onto the device.
    Write,
}

impl TransferKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TransferKind::Read => "read",
            TransferKind::Write => "write",
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "write" => TransferKind::Write,
            _ => TransferKind::Read,
        }
    }
}

/// A transfer's lifecycle state (§4.6 invariants: `started ->
/// in_progress -> (done | failed | paused)`, `paused -> in_progress`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferState {
    /// Record created, no bytes moved yet.
    Started,
    /// At least one chunk has been committed.
    InProgress,
    /// Suspended; resumable.
    Paused,
    /// Finished successfully; no longer resumable.
    Done,
    /// Finished unsuccessfully; no longer resumable.
    Failed,
}

impl TransferState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TransferState::Started => "started",
            TransferState::InProgress => "in_progress",
            TransferState::Paused => "paused",
            TransferState::Done => "done",
            TransferState::Failed => "failed",
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "in_progress" => TransferState::InProgress,
            "paused" => TransferState::Paused,
            "done" => TransferState::Done,
            "failed" => TransferState::Failed,
            _ => TransferState::Started,
        }
    }

    /// Whether a record in this state survives a disconnect and can be
    /// resumed later (§3 `TransferRecord`: "Resumable ⇔ state ∈
    /// {started, in_progress, paused}").
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            TransferState::Started | TransferState::InProgress | TransferState::Paused
        )
    }

    /// Whether `self -> next` is a legal transition per the §4.6 DAG.
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Started, InProgress)
                | (Started, Failed)
                | (InProgress, Done)
                | (InProgress, Failed)
                | (InProgress, Paused)
                | (Paused, InProgress)
                | (Paused, Failed)
        )
    }
}

/// One durable transfer record (§3 `TransferRecord`).
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    /// Row identifier.
    pub id: TransferId,
    /// Owning device's fingerprint or stable identity string.
    pub device_id: String,
    /// Read or write.
    pub kind: TransferKind,
    /// Source object handle, for reads.
    pub handle: Option<u32>,
    /// Destination parent handle, for writes.
    pub parent_handle: Option<u32>,
    /// Object or file name.
    pub name: String,
    /// Total size, if known up front.
    pub total_bytes: Option<u64>,
    /// Bytes durably committed so far.
    pub committed_bytes: u64,
    /// Whether the transport/device supports resuming a partial transfer.
    pub supports_partial: bool,
    /// Local scratch file this transfer is staged through.
    pub local_temp_url: String,
    /// Final destination, once known (reads only).
    pub final_url: Option<String>,
    /// Local source file, for writes.
    pub source_path: Option<String>,
    /// Read-side resume token, checked against the temp file on reconnect.
    pub etag: Option<String>,
    /// Lifecycle state.
    pub state: TransferState,
    /// Device-assigned handle, once a write has been accepted.
    pub remote_handle: Option<u32>,
    /// Hex content hash, once computed.
    pub content_hash: Option<String>,
    /// Most recently observed throughput, in MB/s.
    pub throughput_mb_s: Option<f64>,
    /// The error message from the most recent `fail()`, if any.
    pub last_error: Option<String>,
    /// Wall-clock time of the last mutation.
    pub updated_at: SystemTime,
}

pub(crate) fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64
}

pub(crate) fn from_unix_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

/// Result of reconciling one resumable record against what the device
/// actually reports on reconnect (§4.6 "Reconcile-on-reconnect protocol").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The remote object already matches the expected total; the
    /// record was marked `done`.
    AlreadyComplete,
    /// The remote object (or local temp, for reads) disagreed with the
    /// journal; progress was reset and the record remains resumable.
    Restarted,
    /// Nothing needed to change.
    Unchanged,
}
