//! The real USB backend, built on [`rusb`] (a libusb binding).
//!
//! This mirrors the shape of `cotton-usb-host`'s `HostController`
//! implementations, but targets desktop `std` USB access rather than
//! an on-chip xHCI/OHCI controller: one claimed interface, bulk
//! in/out, and one interrupt-in endpoint, all driven with per-call
//! timeouts rather than a polled register interface.

use std::time::Duration;

use async_trait::async_trait;
use mtp_errors::TransportError;
use tracing::{debug, warn};

use crate::types::{DeviceSummary, OpenOptions};
use crate::UsbLink;

/// The three endpoint addresses a claimed MTP interface exposes.
#[derive(Debug, Copy, Clone)]
struct Endpoints {
    bulk_out: u8,
    bulk_in: u8,
    interrupt_in: u8,
}

/// A [`UsbLink`] backed by a real, attached USB device.
pub struct RusbLink {
    handle: Option<rusb::DeviceHandle<rusb::GlobalContext>>,
    interface: u8,
    endpoints: Option<Endpoints>,
    detached_kernel_driver: bool,
}

impl RusbLink {
    /// Create a link for `bus`/`address`, not yet opened.
    pub fn new() -> Self {
        Self {
            handle: None,
            interface: 0,
            endpoints: None,
            detached_kernel_driver: false,
        }
    }

    fn endpoints(&self) -> Result<Endpoints, TransportError> {
        self.endpoints.ok_or(TransportError::NoDevice)
    }

    fn map_rusb_err(e: rusb::Error) -> TransportError {
        match e {
            rusb::Error::NoDevice => TransportError::NoDevice,
            rusb::Error::Access => TransportError::AccessDenied,
            rusb::Error::Timeout => TransportError::Timeout,
            rusb::Error::Pipe => TransportError::Stall,
            rusb::Error::Busy => TransportError::Busy,
            other => TransportError::Io(other.to_string()),
        }
    }

    fn find_endpoints(
        device: &rusb::Device<rusb::GlobalContext>,
        interface_number: u8,
    ) -> Result<Endpoints, TransportError> {
        let config = device
            .active_config_descriptor()
            .map_err(Self::map_rusb_err)?;
        let iface = config
            .interfaces()
            .find(|i| i.number() == interface_number)
            .ok_or(TransportError::NoDevice)?;
        let desc = iface.descriptors().next().ok_or(TransportError::NoDevice)?;

        let mut bulk_out = None;
        let mut bulk_in = None;
        let mut interrupt_in = None;
        for ep in desc.endpoint_descriptors() {
            use rusb::{Direction, TransferType};
            match (ep.transfer_type(), ep.direction()) {
                (TransferType::Bulk, Direction::Out) => bulk_out = Some(ep.address()),
                (TransferType::Bulk, Direction::In) => bulk_in = Some(ep.address()),
                (TransferType::Interrupt, Direction::In) => {
                    interrupt_in = Some(ep.address())
                }
                _ => {}
            }
        }

        Ok(Endpoints {
            bulk_out: bulk_out.ok_or(TransportError::NoDevice)?,
            bulk_in: bulk_in.ok_or(TransportError::NoDevice)?,
            interrupt_in: interrupt_in.ok_or(TransportError::NoDevice)?,
        })
    }
}

impl Default for RusbLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsbLink for RusbLink {
    async fn open(
        &mut self,
        summary: &DeviceSummary,
        opts: OpenOptions,
    ) -> Result<(), TransportError> {
        let devices = rusb::devices().map_err(Self::map_rusb_err)?;
        let device = devices
            .iter()
            .find(|d| {
                d.bus_number() == summary.bus.unwrap_or(d.bus_number())
                    && d.address() == summary.address.unwrap_or(d.address())
            })
            .ok_or(TransportError::NoDevice)?;

        if opts.reset_on_open {
            debug!(fingerprint = %summary.fingerprint(), "reset_on_open: resetting before claim");
        }

        let mut handle = device.open().map_err(Self::map_rusb_err)?;

        let interface_number = {
            let config = device
                .active_config_descriptor()
                .map_err(Self::map_rusb_err)?;
            config
                .interfaces()
                .find(|i| {
                    i.descriptors().any(|d| {
                        d.class_code() == summary.interface_class
                            && d.sub_class_code() == summary.interface_subclass
                            && d.protocol_code() == summary.interface_protocol
                    })
                })
                .map(|i| i.number())
                .unwrap_or(0)
        };

        if opts.requires_kernel_detach {
            match handle.kernel_driver_active(interface_number) {
                Ok(true) => {
                    handle
                        .detach_kernel_driver(interface_number)
                        .map_err(Self::map_rusb_err)?;
                    self.detached_kernel_driver = true;
                }
                Ok(false) => {}
                Err(rusb::Error::NotSupported) => {}
                Err(e) => return Err(Self::map_rusb_err(e)),
            }
        }

        handle
            .claim_interface(interface_number)
            .map_err(Self::map_rusb_err)?;

        if opts.reset_on_open {
            handle.reset().map_err(Self::map_rusb_err)?;
        }

        let endpoints = Self::find_endpoints(&device, interface_number)?;

        self.interface = interface_number;
        self.endpoints = Some(endpoints);
        self.handle = Some(handle);
        Ok(())
    }

    async fn bulk_out(
        &mut self,
        bytes: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let ep = self.endpoints()?.bulk_out;
        let handle = self.handle.as_ref().ok_or(TransportError::NoDevice)?;
        let n = handle
            .write_bulk(ep, bytes, timeout)
            .map_err(Self::map_rusb_err)?;
        if n != bytes.len() {
            return Err(TransportError::TimeoutInPhase(
                mtp_errors::Phase::BulkOut,
            ));
        }
        Ok(())
    }

    async fn bulk_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let ep = self.endpoints()?.bulk_in;
        let handle = self.handle.as_ref().ok_or(TransportError::NoDevice)?;
        handle
            .read_bulk(ep, buf, timeout)
            .map_err(Self::map_rusb_err)
    }

    async fn interrupt_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let ep = self.endpoints()?.interrupt_in;
        let handle = self.handle.as_ref().ok_or(TransportError::NoDevice)?;
        handle
            .read_interrupt(ep, buf, timeout)
            .map_err(Self::map_rusb_err)
    }

    async fn clear_stall(&mut self, endpoint: u8) -> Result<(), TransportError> {
        let handle = self.handle.as_ref().ok_or(TransportError::NoDevice)?;
        handle.clear_halt(endpoint).map_err(Self::map_rusb_err)
    }

    async fn reset_device(&mut self) -> Result<(), TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NoDevice)?;
        handle.reset().map_err(Self::map_rusb_err)
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.release_interface(self.interface);
            if self.detached_kernel_driver {
                let _ = handle.attach_kernel_driver(self.interface);
            }
        } else {
            warn!("close() called on a link that was never opened");
        }
        self.endpoints = None;
    }
}
