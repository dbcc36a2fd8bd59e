use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::policy::{BusyBackoff, DevicePolicy, Tuning};

/// An inclusive `bcdDevice` range; `None` on either end is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BcdRange {
    /// Lower bound, inclusive.
    pub min: Option<u16>,
    /// Upper bound, inclusive.
    pub max: Option<u16>,
}

impl BcdRange {
    fn contains(&self, bcd: u16) -> bool {
        self.min.map_or(true, |m| bcd >= m) && self.max.map_or(true, |m| bcd <= m)
    }
}

/// A match predicate plus a sparse set of overrides, as shipped in
/// `quirks.json` (§6 "Quirk table format"). `None` for
/// `iface_subclass`/`iface_protocol` means "any" (§4.4, resolved open
/// question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuirkEntry {
    /// Stable, kebab-case identifier for this entry.
    pub id: String,
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// Optional `bcdDevice` range narrowing this entry.
    #[serde(default)]
    pub bcd_range: Option<BcdRange>,
    /// Matched interface class.
    pub iface_class: u8,
    /// Matched interface subclass; `None` = any.
    #[serde(default)]
    pub iface_subclass: Option<u8>,
    /// Matched interface protocol; `None` = any.
    #[serde(default)]
    pub iface_protocol: Option<u8>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Sparse flag overrides.
    #[serde(default)]
    pub flags: FlagOverrides,
    /// Sparse tuning overrides.
    #[serde(default)]
    pub tuning: TuningOverrides,
    /// Per-phase delay hooks in milliseconds.
    #[serde(default)]
    pub hooks: HashMap<String, u64>,
}

/// Sparse flag overrides; `None` leaves the field at its prior value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagOverrides {
    #[serde(default)]
    pub supports_get_object_prop_list: Option<bool>,
    #[serde(default)]
    pub prefers_proplist_enumeration: Option<bool>,
    #[serde(default)]
    pub requires_kernel_detach: Option<bool>,
    #[serde(default)]
    pub camera_class: Option<bool>,
    #[serde(default)]
    pub reset_on_open: Option<bool>,
}

/// Sparse tuning overrides; `None` leaves the field at its prior value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuningOverrides {
    #[serde(default)]
    pub max_chunk_bytes: Option<u64>,
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
    #[serde(default)]
    pub stabilize_ms: Option<u64>,
    #[serde(default)]
    pub busy_backoff: Option<BusyBackoff>,
}

impl QuirkEntry {
    fn matches(&self, vid: u16, pid: u16, bcd: u16, class: u8, subclass: u8, protocol: u8) -> bool {
        self.vid == vid
            && self.pid == pid
            && self.iface_class == class
            && self.iface_subclass.map_or(true, |s| s == subclass)
            && self.iface_protocol.map_or(true, |p| p == protocol)
            && self.bcd_range.map_or(true, |r| r.contains(bcd))
    }

    /// Specificity score used to break ties among matching entries:
    /// a pinned subclass/protocol and a narrower bcd range both count
    /// for more than a wildcard (§4.4).
    fn specificity(&self) -> u32 {
        let mut score = 0;
        if self.iface_subclass.is_some() {
            score += 1;
        }
        if self.iface_protocol.is_some() {
            score += 1;
        }
        if self.bcd_range.is_some() {
            score += 1;
        }
        score
    }

    fn apply(&self, policy: &mut DevicePolicy) {
        let f = &self.flags;
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

        let t = &self.tuning;
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

        for (phase, delay) in &self.hooks {
            policy.hooks.insert(phase.clone(), *delay);
        }
    }
}

/// The shipped-plus-user-overrides static quirk table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuirkTable {
    /// Entries in registration order; later entries break ties among
    /// equally-specific matches (§4.4 step 2).
    pub entries: Vec<QuirkEntry>,
}

impl QuirkTable {
    /// Parse a quirk table from its JSON representation.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Merge `other`'s entries after this table's own (used to layer
    /// `quirks.user.json` on top of the shipped `quirks.json`).
    pub fn extend(&mut self, other: QuirkTable) {
        self.entries.extend(other.entries);
    }

    /// The most specific entry matching the descriptor tuple, per the
    /// tie-break rule in §4.4 step 2: highest specificity wins; ties
    /// broken by later registration.
    pub fn best_match(
        &self,
        vid: u16,
        pid: u16,
        bcd: u16,
        class: u8,
        subclass: u8,
        protocol: u8,
    ) -> Option<&QuirkEntry> {
        self.entries
            .iter()
            .filter(|e| e.matches(vid, pid, bcd, class, subclass, protocol))
            .enumerate()
            .max_by_key(|(idx, e)| (e.specificity(), *idx))
            .map(|(_, e)| e)
    }

    /// Resolve a policy by applying the best static match, or
    /// synthesizing one per §4.4 steps 3/4 when nothing matches.
    pub fn resolve(
        &self,
        vid: u16,
        pid: u16,
        bcd: u16,
        class: u8,
        subclass: u8,
        protocol: u8,
    ) -> DevicePolicy {
        let mut policy = DevicePolicy::default();

        if let Some(entry) = self.best_match(vid, pid, bcd, class, subclass, protocol) {
            entry.apply(&mut policy);
            return policy;
        }

        const PTP_CAMERA_CLASS: u8 = 0x06;
        const VENDOR_SPECIFIC_CLASS: u8 = 0xFF;
        match class {
            PTP_CAMERA_CLASS => {
                policy.camera_class = true;
                policy.supports_get_object_prop_list = true;
                policy.requires_kernel_detach = false;
            }
            VENDOR_SPECIFIC_CLASS => {
                policy.requires_kernel_detach = true;
                policy.supports_get_object_prop_list = false;
                policy.prefers_proplist_enumeration = false;
            }
            _ => {}
        }
        policy
    }
}
