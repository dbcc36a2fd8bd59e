//! Encoding and decoding of PTP/MTP container packets.
//!
//! A PTP container is the basic unit of the wire protocol used by
//! Picture Transfer Protocol (and, by extension, MTP) devices: every
//! command, the data that follows it, the device's response, and any
//! asynchronous event all share the same 12-byte little-endian header
//! described in USB Still Image Capture Device Definition, 5.1.
//!
//! This crate only encodes and decodes bytes; it knows nothing about
//! USB endpoints, sessions, or transaction-ID bookkeeping. That lives
//! one layer up, in the protocol engine.

#![warn(missing_docs)]

mod container;
pub mod opcodes;

pub use container::{
    decode_container, encode_command, encode_data_header, ContainerKind,
    PtpContainer, WireError, HEADER_LEN, MAX_PARAMS,
};

#[cfg(test)]
#[path = "tests/container.rs"]
mod tests;
