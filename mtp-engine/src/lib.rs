//! The per-device PTP/MTP protocol engine (§4.3): a single-threaded
//! actor owning one [`usb_link::UsbLink`], enforcing session and
//! transaction-ID discipline, with the enumeration fallback ladder
//! (§4.5) and the generic fallback-ladder primitive (§4.10) built on
//! top of it.

#![warn(missing_docs)]

mod actor;
mod backoff;
mod command;
mod config;
mod enumeration;
mod events;
mod ladder;
mod state;

pub use actor::{spawn, DeviceHandle, OwnedDataPhase};
pub use backoff::delay_for_attempt;
pub use command::{execute_command, CommandOutcome, DataPhase};
pub use config::Config;
pub use enumeration::{list_children, ObjectInfo};
pub use events::{channel as event_channel, DeviceEvent, EVENT_CHANNEL_CAPACITY};
pub use ladder::{execute as execute_ladder, LadderSuccess, Rung};
pub use state::{EngineState, Session};
