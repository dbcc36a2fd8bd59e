//! Durable record of every in-flight and finished transfer (§4.6):
//! begin/progress/complete/fail bookkeeping, the resumable set, a
//! stale-temp sweep, and the reconcile-on-reconnect state changes.
//!
//! Backed by SQLite (see `mtp-index` for the sibling live-metadata
//! store, which shares the same binding).

#![warn(missing_docs)]

mod error;
mod record;
mod store;

pub use error::JournalError;
pub use record::{
    ReconcileOutcome, TransferId, TransferKind, TransferRecord, TransferState,
};
pub use store::Journal;

#[cfg(test)]
#[path = "tests/store.rs"]
mod tests;
