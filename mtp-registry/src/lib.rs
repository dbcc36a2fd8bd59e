//! The device service and registry (§4.8): stable per-fingerprint
//! identities that outlive individual attachments, plus the
//! attach/detach/extended-absence lifecycle for per-device actor
//! handles.

#![warn(missing_docs)]

mod identity;
mod registry;

pub use identity::{IdentityStore, StableDeviceIdentity};
pub use registry::{Registry, EXTENDED_ABSENCE_THRESHOLD};

#[cfg(test)]
#[path = "tests/registry.rs"]
mod tests;
