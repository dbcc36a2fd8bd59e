//! The persistent live index (§4.7): devices, storages, objects, and
//! a monotonic per-device change counter with a stale-mark/purge
//! sweep for crawl-driven deletions, plus the change-signaling bridge
//! (§4.9) that turns counter advances into notifications.

#![warn(missing_docs)]

mod error;
mod record;
mod signal;
mod store;

pub use error::IndexError;
pub use record::{ChangeKind, ChangeLogEntry, DeviceRow, ObjectRow, ObjectUpsert, StorageRow};
pub use signal::{ChangeNotification, ChangeSignal, DEBOUNCE};
pub use store::Index;

#[cfg(test)]
#[path = "tests/store.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/signal.rs"]
mod signal_tests;
