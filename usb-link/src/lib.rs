//! USB bulk/interrupt transport for PTP/MTP host devices (§4.2).
//!
//! [`UsbLink`] is the capability set the protocol engine depends on.
//! [`RusbLink`] implements it against real hardware via [`rusb`];
//! [`VirtualLink`], [`FaultInjectingLink`], and [`CapturingLink`] are
//! test doubles used by this crate's tests and by `mtp-engine` and
//! `systemtests`.

#![warn(missing_docs)]

mod enumerate;
mod fakes;
#[cfg(feature = "rusb-backend")]
mod rusb_link;
mod trait_def;
mod types;

pub use enumerate::enumerate_candidates;
pub use fakes::{CapturedCall, CapturingLink, FaultInjectingLink, FaultPlan, ScriptedReply, VirtualLink};
#[cfg(feature = "rusb-backend")]
pub use rusb_link::RusbLink;
pub use trait_def::UsbLink;
pub use types::{DeviceSummary, EndpointKind, OpenOptions};

#[cfg(test)]
#[path = "tests/link.rs"]
mod tests;
