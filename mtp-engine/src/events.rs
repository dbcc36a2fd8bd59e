use ptp_wire::opcodes;
use tokio::sync::broadcast;

/// Decoded interrupt-endpoint notification (§4.3 "Events").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A new object appeared; parameter is its handle.
    ObjectAdded(u32),
    /// An object disappeared; parameter is its handle.
    ObjectRemoved(u32),
    /// A storage reported full; parameter is its storage ID.
    StoreFull(u32),
    /// The device's static info changed (rare; usually a firmware update).
    DeviceInfoChanged,
    /// An event code this workspace does not interpret further.
    Other(u16, Vec<u32>),
}

impl DeviceEvent {
    /// Decode from a raw PTP EVENT container's code and parameters.
    pub fn decode(code: u16, params: &[u32]) -> Self {
        match code {
            opcodes::EVENT_OBJECT_ADDED => DeviceEvent::ObjectAdded(params.first().copied().unwrap_or(0)),
            opcodes::EVENT_OBJECT_REMOVED => DeviceEvent::ObjectRemoved(params.first().copied().unwrap_or(0)),
            opcodes::EVENT_STORE_FULL => DeviceEvent::StoreFull(params.first().copied().unwrap_or(0)),
            opcodes::EVENT_DEVICE_INFO_CHANGED => DeviceEvent::DeviceInfoChanged,
            other => DeviceEvent::Other(other, params.to_vec()),
        }
    }
}

/// Bounded broadcast capacity for the per-device event channel; slow
/// subscribers drop the oldest undelivered events rather than stall
/// the command path (§5 "Ordering guarantees").
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Create a fresh event channel for one device attachment.
pub fn channel() -> (broadcast::Sender<DeviceEvent>, broadcast::Receiver<DeviceEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
