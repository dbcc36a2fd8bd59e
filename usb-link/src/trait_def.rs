use std::time::Duration;

use async_trait::async_trait;
use mtp_errors::TransportError;

use crate::types::{DeviceSummary, OpenOptions};

/// The capability set the protocol engine depends on (design note,
/// §9 "Polymorphic link abstraction"). Real USB access
/// ([`crate::RusbLink`]), a scripted double (`VirtualLink`), a
/// fault-injecting wrapper (`FaultInjectingLink`), and a
/// traffic-recording wrapper (`CapturingLink`) all implement it, and
/// the protocol engine is generic only over this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsbLink: Send {
    /// Claim the interface, optionally detaching a kernel driver and
    /// resetting the device first, per `opts`.
    async fn open(
        &mut self,
        summary: &DeviceSummary,
        opts: OpenOptions,
    ) -> Result<(), TransportError>;

    /// Write `bytes` to the bulk-out endpoint.
    async fn bulk_out(
        &mut self,
        bytes: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes from the bulk-in endpoint,
    /// returning the number actually read.
    async fn bulk_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` bytes from the interrupt-in endpoint.
    async fn interrupt_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Clear a halt/stall condition on `endpoint`.
    async fn clear_stall(&mut self, endpoint: u8) -> Result<(), TransportError>;

    /// Issue a USB port reset.
    async fn reset_device(&mut self) -> Result<(), TransportError>;

    /// Release the interface and any OS handles.
    async fn close(&mut self);
}
