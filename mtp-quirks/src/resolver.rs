use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::learned::LearnedProfile;
use crate::policy::DevicePolicy;
use crate::table::{FlagOverrides, QuirkTable, TuningOverrides};

/// The descriptor tuple a device presents at attach time, sufficient
/// to resolve a policy (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// `bcdDevice`.
    pub bcd_device: u16,
    /// Matched interface class.
    pub interface_class: u8,
    /// Matched interface subclass.
    pub interface_subclass: u8,
    /// Matched interface protocol.
    pub interface_protocol: u8,
}

impl DeviceDescriptor {
    /// `"vid:pid"` fingerprint, matching [`usb_link::DeviceSummary::fingerprint`].
    pub fn fingerprint(&self) -> String {
        format!("{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Caller-supplied overrides, merged last (§4.4 step 6).
#[derive(Debug, Clone, Default)]
pub struct CallerOverrides {
    /// Flag overrides.
    pub flags: FlagOverrides,
    /// Tuning overrides.
    pub tuning: TuningOverrides,
}

/// Resolves effective [`DevicePolicy`] values by layering the static
/// table, a learned profile, and caller overrides (§4.4), and tracks
/// per-session auto-demotion (§4.4 "Auto-demotion", §8 invariant 8).
pub struct QuirkResolver {
    table: QuirkTable,
    data_dir: PathBuf,
    /// One entry per fingerprint currently demoted this process
    /// lifetime, so a freshly resolved policy for the same device
    /// doesn't resurrect a capability the device just told us it
    /// lacks.
    demoted: Mutex<std::collections::HashSet<String>>,
}

impl QuirkResolver {
    /// Build a resolver over `table`, persisting learned profiles
    /// under `data_dir`.
    pub fn new(table: QuirkTable, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            table,
            data_dir: data_dir.into(),
            demoted: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Load the shipped table plus an optional user-overrides table
    /// from disk.
    pub fn load(
        shipped_path: &Path,
        user_path: Option<&Path>,
        data_dir: impl Into<PathBuf>,
    ) -> std::io::Result<Self> {
        let shipped = std::fs::read_to_string(shipped_path)?;
        let mut table = QuirkTable::from_json(&shipped)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(p) = user_path {
            if let Ok(text) = std::fs::read_to_string(p) {
                let user = QuirkTable::from_json(&text)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                table.extend(user);
            }
        }
        Ok(Self::new(table, data_dir))
    }

    /// Resolve the effective policy for `descriptor`, folding in any
    /// learned profile and `overrides` (§4.4 steps 1-6).
    pub fn resolve(&self, descriptor: DeviceDescriptor, overrides: &CallerOverrides) -> DevicePolicy {
        let mut policy = self.table.resolve(
            descriptor.vid,
            descriptor.pid,
            descriptor.bcd_device,
            descriptor.interface_class,
            descriptor.interface_subclass,
            descriptor.interface_protocol,
        );

        let fingerprint = descriptor.fingerprint();

        if let Ok(Some(learned)) = LearnedProfile::load(&self.data_dir, &fingerprint) {
            learned.apply(&mut policy);
        }

        apply_flag_overrides(&mut policy, &overrides.flags);
        apply_tuning_overrides(&mut policy, &overrides.tuning);

        if self.demoted.lock().unwrap().contains(&fingerprint) {
            policy.supports_get_object_prop_list = false;
        }

        policy
    }

    /// Record that `GetObjectPropList` returned `OperationNotSupported`
    /// for `fingerprint`: clears the flag for the remainder of the
    /// process and persists it against the learned profile (§4.4
    /// "Auto-demotion", §8 invariant 8).
    pub fn demote_object_prop_list(&self, fingerprint: &str) {
        self.demoted.lock().unwrap().insert(fingerprint.to_string());
        debug!(fingerprint, "auto-demoting supports_get_object_prop_list");

        let mut profile = LearnedProfile::load(&self.data_dir, fingerprint)
            .ok()
            .flatten()
            .unwrap_or_else(|| LearnedProfile {
                fingerprint_hash: fingerprint.to_string(),
                ..Default::default()
            });
        profile.sample_count += 1;
        if let Err(e) = profile.save(&self.data_dir) {
            info!(fingerprint, error = %e, "failed to persist demotion to learned profile");
        }
    }

    /// Whether `fingerprint` has been demoted this process lifetime.
    pub fn is_demoted(&self, fingerprint: &str) -> bool {
        self.demoted.lock().unwrap().contains(fingerprint)
    }
}

fn apply_flag_overrides(policy: &mut DevicePolicy, f: &FlagOverrides) {
    if let Some(v) = f.supports_get_object_prop_list {
        policy.supports_get_object_prop_list = v;
    }
    if let Some(v) = f.prefers_proplist_enumeration {
        policy.prefers_proplist_enumeration = v;
    }
    if let Some(v) = f.requires_kernel_detach {
        policy.requires_kernel_detach = v;
    }
    if let Some(v) = f.camera_class {
        policy.camera_class = v;
    }
    if let Some(v) = f.reset_on_open {
        policy.reset_on_open = v;
    }
}

fn apply_tuning_overrides(policy: &mut DevicePolicy, t: &TuningOverrides) {
    if let Some(v) = t.max_chunk_bytes {
        policy.tuning.max_chunk_bytes = v;
    }
    if let Some(v) = t.handshake_timeout_ms {
        policy.tuning.handshake_timeout_ms = v;
    }
    if let Some(v) = t.io_timeout_ms {
        policy.tuning.io_timeout_ms = v;
    }
    if let Some(v) = t.stabilize_ms {
        policy.tuning.stabilize_ms = v;
    }
    if let Some(v) = t.busy_backoff {
        policy.tuning.busy_backoff = v;
    }
}
