use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::trace;

/// Minimum time between re-crawl triggers for the same key, unless a
/// change counter has advanced since the last trigger (§4.9).
pub const DEBOUNCE: Duration = Duration::from_secs(30);

const CHANNEL_CAPACITY: usize = 256;

/// A notification that a device's live index changed (§4.9). `None`
/// storage/parent means a device-wide "working set" notification
/// rather than one scoped to a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// The device whose index advanced.
    pub device_id: String,
    /// The storage affected, or `None` for a working-set notification.
    pub storage_id: Option<u32>,
    /// The parent directory affected, or `None` for the storage root
    /// or a working-set notification.
    pub parent_handle: Option<u32>,
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct Key {
    device_id: String,
    storage_id: u32,
    parent_handle: Option<u32>,
}

struct DebounceState {
    last_fired_at: Instant,
    last_counter: i64,
}

/// The change-signaling bridge: translates index change-counter
/// advances into best-effort notifications for registered consumers,
/// debounced per `(device, storage, parent)`.
///
/// Consumers subscribe via [`ChangeSignal::subscribe`]; a slow or
/// absent subscriber simply misses notifications (bounded broadcast
/// buffer) rather than blocking the index writer, mirroring the
/// device event channel in `mtp-engine`.
pub struct ChangeSignal {
    tx: broadcast::Sender<ChangeNotification>,
    debounced: Mutex<HashMap<Key, DebounceState>>,
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSignal {
    /// Create a fresh signaling bridge.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        ChangeSignal { tx, debounced: Mutex::new(HashMap::new()) }
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.tx.subscribe()
    }

    /// Report that `device_id`'s change counter advanced to
    /// `change_counter` because of a mutation under `(storage_id,
    /// parent_handle)`. Fires a notification unless one already fired
    /// for this key within [`DEBOUNCE`] and the counter has not moved
    /// since. Returns whether a notification was actually sent.
    pub fn notify_children_changed(
        &self,
        device_id: &str,
        storage_id: u32,
        parent_handle: Option<u32>,
        change_counter: i64,
    ) -> bool {
        let key = Key { device_id: device_id.to_string(), storage_id, parent_handle };
        let now = Instant::now();
        let mut debounced = self.debounced.lock().unwrap();
        let should_fire = match debounced.get(&key) {
            Some(state) => now.duration_since(state.last_fired_at) >= DEBOUNCE || change_counter > state.last_counter,
            None => true,
        };
        if !should_fire {
            trace!(device_id, storage_id, "change notification debounced");
            return false;
        }
        debounced.insert(key, DebounceState { last_fired_at: now, last_counter: change_counter });
        drop(debounced);
        let _ = self.tx.send(ChangeNotification {
            device_id: device_id.to_string(),
            storage_id: Some(storage_id),
            parent_handle,
        });
        true
    }

    /// Emit a device-wide working-set notification, bypassing the
    /// per-directory debounce.
    pub fn notify_working_set(&self, device_id: &str) {
        let _ = self.tx.send(ChangeNotification {
            device_id: device_id.to_string(),
            storage_id: None,
            parent_handle: None,
        });
    }
}
