//! Device-quirk policy resolution for PTP/MTP hosts (§4.4).
//!
//! A layered matcher folds a declarative static table, an optional
//! learned profile, and caller overrides into one effective
//! [`DevicePolicy`] -- never per-device code paths (§9 "Quirk database
//! as data, not code").

#![warn(missing_docs)]

mod learned;
mod policy;
mod resolver;
mod table;

pub use learned::{fingerprint_hash, learned_path, LearnedProfile};
pub use policy::{BusyBackoff, DevicePolicy, Tuning};
pub use resolver::{CallerOverrides, DeviceDescriptor, QuirkResolver};
pub use table::{BcdRange, FlagOverrides, QuirkEntry, QuirkTable, TuningOverrides};

#[cfg(test)]
#[path = "tests/resolver.rs"]
mod tests;
