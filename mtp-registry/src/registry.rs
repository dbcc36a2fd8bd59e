use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use mtp_engine::DeviceHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::identity::{IdentityStore, StableDeviceIdentity};

/// How long an offline device's registry entry is kept before it is
/// unregistered outright (§4.8, default 24h).
pub const EXTENDED_ABSENCE_THRESHOLD: Duration = Duration::from_secs(24 * 3600);

struct Entry {
    domain_id: Uuid,
    fingerprint: String,
    handle: Option<DeviceHandle>,
    online: bool,
    last_seen_at: SystemTime,
}

/// The device service registry (§4.8): maps an ephemeral per-attachment
/// `device_id` to its actor handle, and a stable `domain_id` back to
/// the current `device_id` for that fingerprint, across reconnects.
pub struct Registry {
    entries: Mutex<HashMap<String, Entry>>,
    by_domain: Mutex<HashMap<Uuid, String>>,
    identities: Mutex<IdentityStore>,
    absence_threshold: Duration,
}

impl Registry {
    /// Create a registry backed by identities persisted under `data_dir`.
    pub fn new(data_dir: impl AsRef<std::path::Path>) -> Self {
        Self::with_threshold(data_dir, EXTENDED_ABSENCE_THRESHOLD)
    }

    /// Create a registry with a non-default extended-absence threshold
    /// (exposed for tests).
    pub fn with_threshold(data_dir: impl AsRef<std::path::Path>, absence_threshold: Duration) -> Self {
        Registry {
            entries: Mutex::new(HashMap::new()),
            by_domain: Mutex::new(HashMap::new()),
            identities: Mutex::new(IdentityStore::load(data_dir)),
            absence_threshold,
        }
    }

    /// Register a fresh attachment. Resolves (or mints) the
    /// fingerprint's [`StableDeviceIdentity`], assigns a new
    /// `device_id` for this attachment, and marks it online.
    pub fn attach(&self, device_id: &str, fingerprint: &str, handle: DeviceHandle) -> StableDeviceIdentity {
        let identity = {
            let mut identities = self.identities.lock().unwrap();
            let identity = identities.resolve(fingerprint);
            let _ = identities.save();
            identity
        };

        let mut entries = self.entries.lock().unwrap();
        let mut by_domain = self.by_domain.lock().unwrap();

        if let Some(stale_device_id) = by_domain.get(&identity.domain_id).cloned() {
            if stale_device_id != device_id {
                entries.remove(&stale_device_id);
            }
        }

        entries.insert(
            device_id.to_string(),
            Entry {
                domain_id: identity.domain_id,
                fingerprint: fingerprint.to_string(),
                handle: Some(handle),
                online: true,
                last_seen_at: SystemTime::now(),
            },
        );
        by_domain.insert(identity.domain_id, device_id.to_string());
        info!(device_id, domain_id = %identity.domain_id, "device attached");
        identity
    }

    /// Mark `device_id` offline without forgetting it; the entry is
    /// swept after [`Self::absence_threshold`] with no reconnect.
    pub fn detach(&self, device_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(device_id) {
            entry.online = false;
            entry.handle = None;
            entry.last_seen_at = SystemTime::now();
            debug!(device_id, "device detached");
        }
    }

    /// The live actor handle for `device_id`, if it is currently online.
    pub fn handle(&self, device_id: &str) -> Option<DeviceHandle> {
        self.entries.lock().unwrap().get(device_id).and_then(|e| e.handle.clone())
    }

    /// Resolve a stable `domain_id` back to its current `device_id`,
    /// if that identity has an active registry entry.
    pub fn device_id_for_domain(&self, domain_id: Uuid) -> Option<String> {
        self.by_domain.lock().unwrap().get(&domain_id).cloned()
    }

    /// Whether `device_id` is currently marked online.
    pub fn is_online(&self, device_id: &str) -> bool {
        self.entries.lock().unwrap().get(device_id).map(|e| e.online).unwrap_or(false)
    }

    /// Unregister every entry that has been offline for longer than
    /// the absence threshold. The embedding binary is expected to call
    /// this periodically (no background task is spawned here, per the
    /// same policy as `mtp_journal::Journal::clear_stale_temps`).
    pub fn sweep_expired(&self) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap();
        let mut by_domain = self.by_domain.lock().unwrap();
        let now = SystemTime::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| !e.online && now.duration_since(e.last_seen_at).unwrap_or_default() >= self.absence_threshold)
            .map(|(id, _)| id.clone())
            .collect();
        for device_id in &expired {
            if let Some(entry) = entries.remove(device_id) {
                by_domain.remove(&entry.domain_id);
                info!(device_id, "device entry expired after extended absence");
            }
        }
        expired
    }

    /// The fingerprint registered for `device_id`, if any.
    pub fn fingerprint(&self, device_id: &str) -> Option<String> {
        self.entries.lock().unwrap().get(device_id).map(|e| e.fingerprint.clone())
    }
}
