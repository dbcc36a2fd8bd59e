use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capability and tuning flags the protocol engine obeys for one
/// session (§3 `DevicePolicy`). Immutable per session except for
/// auto-demotion, which clears a flag in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePolicy {
    /// Whether `GetObjectPropList` (0x9805) is trusted for enumeration.
    pub supports_get_object_prop_list: bool,
    /// Whether the enumeration ladder should prefer proplist even
    /// when both strategies are available.
    pub prefers_proplist_enumeration: bool,
    /// Detach a kernel driver bound to the interface before claiming it.
    pub requires_kernel_detach: bool,
    /// Device matched the PTP still-image-capture interface class.
    pub camera_class: bool,
    /// Issue a USB reset before the first session.
    pub reset_on_open: bool,
    /// Tuning values.
    pub tuning: Tuning,
    /// Per-phase delay hooks, keyed by phase name.
    pub hooks: HashMap<String, u64>,
}

impl Default for DevicePolicy {
    fn default() -> Self {
        Self {
            supports_get_object_prop_list: false,
            prefers_proplist_enumeration: false,
            requires_kernel_detach: false,
            camera_class: false,
            reset_on_open: false,
            tuning: Tuning::default(),
            hooks: HashMap::new(),
        }
    }
}

/// Timing tuning values (§6 "Quirk table format").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Maximum bytes pumped per DATA container chunk.
    pub max_chunk_bytes: u64,
    /// Deadline for OpenSession's handshake.
    pub handshake_timeout_ms: u64,
    /// Deadline for one bulk phase.
    pub io_timeout_ms: u64,
    /// Settle time after `open()` before issuing commands.
    pub stabilize_ms: u64,
    /// Retry policy for `Busy` responses.
    pub busy_backoff: BusyBackoff,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 4 * 1024 * 1024,
            handshake_timeout_ms: 10_000,
            io_timeout_ms: 15_000,
            stabilize_ms: 0,
            busy_backoff: BusyBackoff::default(),
        }
    }
}

/// Exponential backoff with jitter for `Busy` responses (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusyBackoff {
    /// Number of retry attempts after the first `Busy`.
    pub retries: u32,
    /// Base delay; attempt `n` waits `base_ms * 2^n`.
    pub base_ms: u64,
    /// Uniform jitter applied to each delay, as a percentage.
    pub jitter_pct: u8,
}

impl Default for BusyBackoff {
    fn default() -> Self {
        Self {
            retries: 3,
            base_ms: 250,
            jitter_pct: 20,
        }
    }
}
