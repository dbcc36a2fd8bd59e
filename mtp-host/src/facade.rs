use std::sync::Arc;
use std::time::SystemTime;

use mtp_engine::DeviceHandle;
use mtp_index::{ChangeLogEntry, ChangeSignal, Index, ObjectUpsert, StorageRow};
use mtp_journal::Journal;
use mtp_registry::Registry;
use ptp_wire::opcodes;
use tracing::debug;

use crate::error::HostError;
use crate::objectinfo::encode_object_info;
use crate::paths::sanitize;
use crate::readers::{pump_write, ChunkSource, ObjectReader};

struct Inner {
    registry: Registry,
    index: Index,
    journal: Journal,
    signal: ChangeSignal,
}

/// The consumer-facing facade (§6): list/read/write/delete objects,
/// sync anchors, crawl requests, device status. Wraps the per-device
/// [`Registry`], the persistent [`Index`], the transfer [`Journal`],
/// and the [`ChangeSignal`] bridge behind one `Clone`-able handle,
/// mirroring the `Arc<Inner>` sharing `cotton-ssdp`'s `AsyncService`
/// uses for a service shared across readers and async tasks.
#[derive(Clone)]
pub struct Host {
    inner: Arc<Inner>,
}

/// Whether a device is attached, and whether its session is currently
/// open (§6 `device_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Whether the registry has a live actor handle for this device.
    pub connected: bool,
    /// Whether that actor currently has an open PTP session.
    ///
    /// The registry only tracks attachment, not session state, so this
    /// mirrors `connected`: a disconnected device has no session, and
    /// an attached device's actor opens its session as its first act
    /// (§4.3). Callers that need finer-grained session state should
    /// watch the device's event stream instead.
    pub session_open: bool,
}

impl Host {
    /// Build a facade over a fresh registry (rooted at `data_dir`),
    /// index, and journal, all backed by SQLite at the given paths.
    pub fn open(data_dir: impl AsRef<std::path::Path>, index_path: impl AsRef<std::path::Path>, journal_path: impl AsRef<std::path::Path>) -> Result<Self, HostError> {
        Ok(Host {
            inner: Arc::new(Inner {
                registry: Registry::new(data_dir),
                index: Index::open(index_path)?,
                journal: Journal::open(journal_path)?,
                signal: ChangeSignal::new(),
            }),
        })
    }

    /// Build an in-memory facade, for tests.
    pub fn open_in_memory(data_dir: impl AsRef<std::path::Path>) -> Result<Self, HostError> {
        Ok(Host {
            inner: Arc::new(Inner {
                registry: Registry::new(data_dir),
                index: Index::open_in_memory()?,
                journal: Journal::open_in_memory()?,
                signal: ChangeSignal::new(),
            }),
        })
    }

    /// The shared registry, for embedders that attach/detach devices
    /// directly (e.g. a USB hotplug watcher).
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Subscribe to change notifications across every device.
    pub fn subscribe_changes(&self) -> tokio::sync::broadcast::Receiver<mtp_index::ChangeNotification> {
        self.inner.signal.subscribe()
    }

    fn handle(&self, device: &str) -> Result<DeviceHandle, HostError> {
        self.inner
            .registry
            .handle(device)
            .ok_or_else(|| HostError::DeviceOffline(device.to_string()))
    }

    /// List the storages known for `device` (§6 `list_storages`).
    pub fn list_storages(&self, device: &str) -> Result<Vec<StorageRow>, HostError> {
        Ok(self.inner.index.storages(device)?)
    }

    /// List the non-tombstoned children of `(storage, parent)` from
    /// the live index (§6 `list_children`). Does not itself crawl the
    /// device; call [`Host::request_crawl`] to refresh a directory
    /// that has never been populated.
    pub fn list_children(&self, device: &str, storage_id: u32, parent: Option<u32>) -> Result<Vec<mtp_index::ObjectRow>, HostError> {
        Ok(self.inner.index.children(device, storage_id, parent)?)
    }

    /// Status of a registered device (§6 `device_status`).
    pub fn device_status(&self, device: &str) -> DeviceStatus {
        let connected = self.inner.registry.is_online(device);
        DeviceStatus {
            connected,
            session_open: connected,
        }
    }

    /// The current change-counter anchor for `device` (§6
    /// `current_sync_anchor`). A consumer persists this and passes it
    /// back to [`Host::changes_since`] on its next sync.
    pub fn current_sync_anchor(&self, device: &str) -> Result<i64, HostError> {
        Ok(self.inner.index.current_change_counter(device)?)
    }

    /// Every change-log entry past `anchor`, ascending (§6
    /// `changes_since`, §8 invariant 5).
    pub fn changes_since(&self, device: &str, anchor: i64) -> Result<Vec<ChangeLogEntry>, HostError> {
        Ok(self.inner.index.changes_since(device, anchor)?)
    }

    /// Begin reading one object's content (§6 `read_object`). Returns
    /// a chunked reader plus the total size; the reader journals
    /// progress as it is pumped so the transfer can be reconciled on
    /// reconnect (§4.6).
    pub async fn read_object(&self, device: &str, handle: u32) -> Result<(ObjectReader, u64), HostError> {
        let dh = self.handle(device)?;
        let row = self
            .inner
            .index
            .find_object(device, handle)?
            .ok_or_else(|| HostError::Engine(mtp_errors::EngineError::Protocol(mtp_errors::ProtocolError::ObjectNotFound)))?;
        let total_bytes = row.size.unwrap_or(0);

        let temp_path = format!("{}.partial", sanitize(&row.path_key));
        let final_path = sanitize(&row.path_key);
        let transfer_id = self.inner.journal.begin_read(
            device,
            handle,
            &row.name,
            row.size,
            true,
            &temp_path,
            Some(final_path.as_str()),
            None,
        )?;

        Ok((
            ObjectReader::new(dh, self.inner.journal.clone(), transfer_id, handle, total_bytes),
            total_bytes,
        ))
    }

    /// Write `source`'s content as a new object under `parent` (§6
    /// `write_object`): issues `SendObjectInfo`, journals the transfer,
    /// pumps `source` through `SendObject`, and verifies the
    /// committed byte count before marking the journal entry done.
    pub async fn write_object(
        &self,
        device: &str,
        storage_id: u32,
        parent: Option<u32>,
        name: &str,
        size: u64,
        source: &mut dyn ChunkSource,
    ) -> Result<u32, HostError> {
        let dh = self.handle(device)?;
        let clean_name = sanitize(name);
        let format_code = 0x3000; // Undefined; this facade does not infer media types.

        let temp_path = format!("{clean_name}.upload");
        let transfer_id = self.inner.journal.begin_write(
            device,
            parent,
            &clean_name,
            size,
            true,
            &temp_path,
            Some(temp_path.as_str()),
        )?;

        let info = encode_object_info(parent, storage_id, &clean_name, size, format_code);
        let parent_param = parent.unwrap_or(0xFFFF_FFFF);
        let outcome = dh
            .execute(
                opcodes::SEND_OBJECT_INFO,
                vec![storage_id, parent_param],
                mtp_engine::OwnedDataPhase::Out { bytes: info },
            )
            .await;
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                self.inner.journal.fail(transfer_id, &e.to_string())?;
                return Err(e.into());
            }
        };
        let new_handle = *outcome.params.first().unwrap_or(&0);

        let mut remote_handle_slot = None;
        pump_write(&dh, &self.inner.journal, transfer_id, &mut remote_handle_slot, new_handle, size, source).await?;

        let path_key = join_path_key(parent_and_name(&self.inner.index, device, parent)?, &clean_name);
        let counter = self.inner.index.upsert_object(
            device,
            &ObjectUpsert {
                storage_id,
                handle: new_handle,
                parent_handle: parent,
                name: clean_name.clone(),
                path_key,
                size: Some(size),
                mtime: Some(unix_now()),
                format_code,
                is_directory: false,
            },
            0,
        )?;
        self.inner.signal.notify_children_changed(device, storage_id, parent, counter);

        Ok(new_handle)
    }

    /// Delete an object (§6 `delete_object`). `recursive` is accepted
    /// for folders whose children have not yet been individually
    /// crawled; this facade always issues a single `DeleteObject` for
    /// `handle` and lets the device cascade the deletion, then purges
    /// the index subtree locally.
    pub async fn delete_object(&self, device: &str, handle: u32, recursive: bool) -> Result<(), HostError> {
        let dh = self.handle(device)?;
        let row = self.inner.index.find_object(device, handle)?;

        dh.execute(opcodes::DELETE_OBJECT, vec![handle], mtp_engine::OwnedDataPhase::None).await?;

        if let Some(row) = row {
            if recursive && row.is_directory {
                self.inner.index.mark_stale_children(device, row.storage_id, Some(handle))?;
                self.inner.index.purge_stale(device, row.storage_id, Some(handle))?;
            }
            self.inner.index.remove_object(device, row.storage_id, handle)?;
            let counter = self.inner.index.current_change_counter(device)?;
            self.inner.signal.notify_children_changed(device, row.storage_id, row.parent_handle, counter);
        }
        Ok(())
    }

    /// Create a folder under `parent` on `storage` (§6 `create_folder`).
    /// Classic PTP has no dedicated "create directory" opcode; folders
    /// are created the same way files are announced, via
    /// `SendObjectInfo` with an association object format and zero
    /// size, with no following `SendObject` data phase.
    pub async fn create_folder(&self, device: &str, storage_id: u32, parent: Option<u32>, name: &str) -> Result<u32, HostError> {
        let dh = self.handle(device)?;
        let clean_name = sanitize(name);
        const ASSOCIATION_FORMAT: u16 = 0x3001;
        let info = encode_object_info(parent, storage_id, &clean_name, 0, ASSOCIATION_FORMAT);
        let parent_param = parent.unwrap_or(0xFFFF_FFFF);
        let outcome = dh
            .execute(
                opcodes::SEND_OBJECT_INFO,
                vec![storage_id, parent_param],
                mtp_engine::OwnedDataPhase::Out { bytes: info },
            )
            .await?;
        let new_handle = *outcome.params.first().unwrap_or(&0);

        let path_key = join_path_key(parent_and_name(&self.inner.index, device, parent)?, &clean_name);
        let counter = self.inner.index.upsert_object(
            device,
            &ObjectUpsert {
                storage_id,
                handle: new_handle,
                parent_handle: parent,
                name: clean_name.clone(),
                path_key,
                size: None,
                mtime: Some(unix_now()),
                format_code: ASSOCIATION_FORMAT,
                is_directory: true,
            },
            0,
        )?;
        self.inner.signal.notify_children_changed(device, storage_id, parent, counter);
        Ok(new_handle)
    }

    /// Request that `(storage, parent)` be re-crawled (§6
    /// `request_crawl`). Non-blocking: records the crawl timestamp and
    /// emits a debounced notification; the actual `list_children`
    /// enumeration and index upsert is left to the caller (typically a
    /// crawl worker subscribed to [`Host::subscribe_changes`]), since
    /// this facade does not own a background task runtime.
    pub fn request_crawl(&self, device: &str, storage_id: u32, parent: Option<u32>) -> Result<(), HostError> {
        self.inner.index.record_crawl(device, storage_id, parent)?;
        let counter = self.inner.index.current_change_counter(device)?;
        if self.inner.signal.notify_children_changed(device, storage_id, parent, counter) {
            debug!(device, storage_id, "crawl requested");
        }
        Ok(())
    }

    /// The transfer journal, for embedders that need to resume or
    /// inspect in-flight transfers directly (§4.6 resumability).
    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// The live index, for embedders driving a crawl worker.
    pub fn index(&self) -> &Index {
        &self.inner.index
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn parent_and_name(index: &Index, device: &str, parent: Option<u32>) -> Result<Option<String>, HostError> {
    match parent {
        None => Ok(None),
        Some(h) => Ok(index.find_object(device, h)?.map(|r| r.path_key)),
    }
}

fn join_path_key(parent_path: Option<String>, name: &str) -> String {
    match parent_path {
        Some(p) => format!("{}/{}", p.trim_end_matches('/'), name),
        None => format!("/{name}"),
    }
}
