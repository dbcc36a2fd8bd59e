use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stable, long-lived identity for a device, keyed by its `"vid:pid"`
/// fingerprint (§3 `StableDeviceIdentity`). Outlives any individual
/// attachment; minted once per fingerprint and refined thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StableDeviceIdentity {
    /// The identity's permanent UUID.
    pub domain_id: Uuid,
    /// The fingerprint this identity was minted for.
    pub fingerprint: String,
    /// An operator-assigned or device-reported display name.
    pub display_name: Option<String>,
    /// Unix seconds of first mint.
    pub created_at: i64,
    /// Unix seconds of the most recent attach.
    pub last_seen_at: i64,
}

fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// A flat-file store of [`StableDeviceIdentity`] records, keyed by
/// fingerprint, mirroring the JSON persistence `mtp-quirks::learned`
/// uses for tuning profiles.
pub struct IdentityStore {
    path: PathBuf,
    identities: HashMap<String, StableDeviceIdentity>,
}

impl IdentityStore {
    /// Load `identities.json` from `data_dir`, or start empty if absent.
    pub fn load(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join("identities.json");
        let identities = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Vec<StableDeviceIdentity>>(&bytes).ok())
            .map(|v| v.into_iter().map(|id| (id.fingerprint.clone(), id)).collect())
            .unwrap_or_default();
        IdentityStore { path, identities }
    }

    /// Resolve the identity for `fingerprint`, minting a fresh one if
    /// none exists yet, and refreshing `last_seen_at`.
    pub fn resolve(&mut self, fingerprint: &str) -> StableDeviceIdentity {
        let now = unix_secs(SystemTime::now());
        let entry = self.identities.entry(fingerprint.to_string()).or_insert_with(|| StableDeviceIdentity {
            domain_id: Uuid::new_v4(),
            fingerprint: fingerprint.to_string(),
            display_name: None,
            created_at: now,
            last_seen_at: now,
        });
        entry.last_seen_at = now;
        entry.clone()
    }

    /// Persist the current set of identities.
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let all: Vec<&StableDeviceIdentity> = self.identities.values().collect();
        let bytes = serde_json::to_vec_pretty(&all)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.path, bytes)
    }
}
