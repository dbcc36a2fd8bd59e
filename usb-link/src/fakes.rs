//! Test doubles for [`UsbLink`]. `VirtualLink` plays back a scripted
//! device; `FaultInjectingLink` wraps any other link and forces
//! specific calls to fail; `CapturingLink` wraps any other link and
//! records every call for later assertion.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use mtp_errors::TransportError;

use crate::types::{DeviceSummary, OpenOptions};
use crate::UsbLink;

/// One scripted reply `VirtualLink` will hand back for a `bulk_in` or
/// `interrupt_in` call, in the order they are queued.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return these bytes (truncated to the caller's buffer).
    Bytes(Vec<u8>),
    /// Fail with this error.
    Err(TransportError),
}

/// A fully in-memory [`UsbLink`] that plays back queued responses.
/// Used by `mtp-engine` unit tests and the integration-test fixtures
/// to exercise the protocol engine without real hardware.
#[derive(Default)]
pub struct VirtualLink {
    opened: bool,
    bulk_in_queue: VecDeque<ScriptedReply>,
    interrupt_in_queue: VecDeque<ScriptedReply>,
    bulk_out_log: Vec<Vec<u8>>,
    open_err: Option<TransportError>,
}

impl VirtualLink {
    /// A link with nothing queued; `bulk_in`/`interrupt_in` calls made
    /// before queuing a reply return `TransportError::Timeout`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open()` call fail with `err`.
    pub fn fail_open(mut self, err: TransportError) -> Self {
        self.open_err = Some(err);
        self
    }

    /// Queue a bulk-in reply.
    pub fn queue_bulk_in(&mut self, reply: ScriptedReply) {
        self.bulk_in_queue.push_back(reply);
    }

    /// Queue an interrupt-in reply (an event).
    pub fn queue_interrupt_in(&mut self, reply: ScriptedReply) {
        self.interrupt_in_queue.push_back(reply);
    }

    /// Every byte slice written via `bulk_out`, in call order.
    pub fn bulk_out_log(&self) -> &[Vec<u8>] {
        &self.bulk_out_log
    }
}

fn deliver(buf: &mut [u8], reply: Option<ScriptedReply>) -> Result<usize, TransportError> {
    match reply {
        None => Err(TransportError::Timeout),
        Some(ScriptedReply::Err(e)) => Err(e),
        Some(ScriptedReply::Bytes(bytes)) => {
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            Ok(n)
        }
    }
}

#[async_trait]
impl UsbLink for VirtualLink {
    async fn open(
        &mut self,
        _summary: &DeviceSummary,
        _opts: OpenOptions,
    ) -> Result<(), TransportError> {
        if let Some(e) = self.open_err.clone() {
            return Err(e);
        }
        self.opened = true;
        Ok(())
    }

    async fn bulk_out(&mut self, bytes: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        if !self.opened {
            return Err(TransportError::NoDevice);
        }
        self.bulk_out_log.push(bytes.to_vec());
        Ok(())
    }

    async fn bulk_in(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if !self.opened {
            return Err(TransportError::NoDevice);
        }
        deliver(buf, self.bulk_in_queue.pop_front())
    }

    async fn interrupt_in(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if !self.opened {
            return Err(TransportError::NoDevice);
        }
        deliver(buf, self.interrupt_in_queue.pop_front())
    }

    async fn clear_stall(&mut self, _endpoint: u8) -> Result<(), TransportError> {
        Ok(())
    }

    async fn reset_device(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) {
        self.opened = false;
    }
}

/// Which calls a [`FaultInjectingLink`] should force to fail, and how
/// many times before reverting to passing through.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail this many subsequent `bulk_out` calls.
    pub bulk_out_failures: VecDeque<TransportError>,
    /// Fail this many subsequent `bulk_in` calls.
    pub bulk_in_failures: VecDeque<TransportError>,
    /// Fail this many subsequent `interrupt_in` calls.
    pub interrupt_in_failures: VecDeque<TransportError>,
}

/// Wraps another [`UsbLink`] and forces specific calls to fail
/// according to a [`FaultPlan`], to exercise the protocol engine's
/// retry, stall-recovery, and fallback-demotion logic (§4.3, §4.10).
pub struct FaultInjectingLink<L> {
    inner: L,
    plan: FaultPlan,
}

impl<L: UsbLink> FaultInjectingLink<L> {
    /// Wrap `inner`, injecting faults per `plan`.
    pub fn new(inner: L, plan: FaultPlan) -> Self {
        Self { inner, plan }
    }
}

#[async_trait]
impl<L: UsbLink + Send> UsbLink for FaultInjectingLink<L> {
    async fn open(
        &mut self,
        summary: &DeviceSummary,
        opts: OpenOptions,
    ) -> Result<(), TransportError> {
        self.inner.open(summary, opts).await
    }

    async fn bulk_out(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        if let Some(e) = self.plan.bulk_out_failures.pop_front() {
            return Err(e);
        }
        self.inner.bulk_out(bytes, timeout).await
    }

    async fn bulk_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if let Some(e) = self.plan.bulk_in_failures.pop_front() {
            return Err(e);
        }
        self.inner.bulk_in(buf, timeout).await
    }

    async fn interrupt_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if let Some(e) = self.plan.interrupt_in_failures.pop_front() {
            return Err(e);
        }
        self.inner.interrupt_in(buf, timeout).await
    }

    async fn clear_stall(&mut self, endpoint: u8) -> Result<(), TransportError> {
        self.inner.clear_stall(endpoint).await
    }

    async fn reset_device(&mut self) -> Result<(), TransportError> {
        self.inner.reset_device().await
    }

    async fn close(&mut self) {
        self.inner.close().await
    }
}

/// One recorded call, for [`CapturingLink::log`] assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedCall {
    /// `open()` was called.
    Open,
    /// `bulk_out()` was called with these bytes.
    BulkOut(Vec<u8>),
    /// `bulk_in()` returned this many bytes (or failed).
    BulkIn(Result<usize, String>),
    /// `interrupt_in()` returned this many bytes (or failed).
    InterruptIn(Result<usize, String>),
    /// `clear_stall()` was called on this endpoint.
    ClearStall(u8),
    /// `reset_device()` was called.
    ResetDevice,
    /// `close()` was called.
    Close,
}

/// Wraps another [`UsbLink`] and records every call made through it,
/// for assertions in integration tests (§9A.4).
pub struct CapturingLink<L> {
    inner: L,
    log: Vec<CapturedCall>,
}

impl<L: UsbLink> CapturingLink<L> {
    /// Wrap `inner`, recording all calls.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            log: Vec::new(),
        }
    }

    /// The calls made through this link, in order.
    pub fn log(&self) -> &[CapturedCall] {
        &self.log
    }
}

#[async_trait]
impl<L: UsbLink + Send> UsbLink for CapturingLink<L> {
    async fn open(
        &mut self,
        summary: &DeviceSummary,
        opts: OpenOptions,
    ) -> Result<(), TransportError> {
        let r = self.inner.open(summary, opts).await;
        self.log.push(CapturedCall::Open);
        r
    }

    async fn bulk_out(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        self.log.push(CapturedCall::BulkOut(bytes.to_vec()));
        self.inner.bulk_out(bytes, timeout).await
    }

    async fn bulk_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let r = self.inner.bulk_in(buf, timeout).await;
        self.log
            .push(CapturedCall::BulkIn(r.clone().map_err(|e| e.to_string())));
        r
    }

    async fn interrupt_in(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let r = self.inner.interrupt_in(buf, timeout).await;
        self.log
            .push(CapturedCall::InterruptIn(r.clone().map_err(|e| e.to_string())));
        r
    }

    async fn clear_stall(&mut self, endpoint: u8) -> Result<(), TransportError> {
        self.log.push(CapturedCall::ClearStall(endpoint));
        self.inner.clear_stall(endpoint).await
    }

    async fn reset_device(&mut self) -> Result<(), TransportError> {
        self.log.push(CapturedCall::ResetDevice);
        self.inner.reset_device().await
    }

    async fn close(&mut self) {
        self.log.push(CapturedCall::Close);
        self.inner.close().await
    }
}
