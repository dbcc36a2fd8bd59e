use std::sync::Arc;

use mtp_errors::{EngineError, FallbackAllFailed};
use mtp_quirks::{DevicePolicy, QuirkResolver};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};
use usb_link::{DeviceSummary, OpenOptions, UsbLink};

use crate::command::{execute_command, CommandOutcome, DataPhase};
use crate::enumeration::{list_children, ObjectInfo};
use crate::events::{self, DeviceEvent};
use crate::state::{EngineState, Session};

/// An owned stand-in for [`DataPhase`] that can cross an `mpsc`
/// channel (`DataPhase` borrows its outbound payload, which a message
/// can't do).
pub enum OwnedDataPhase {
    /// No data phase.
    None,
    /// Expect an inbound DATA container up to `max_len` bytes.
    In {
        /// Maximum payload size accepted.
        max_len: usize,
    },
    /// Send this payload outbound.
    Out {
        /// The payload to send.
        bytes: Vec<u8>,
    },
}

impl OwnedDataPhase {
    fn borrow(&self) -> DataPhase<'_> {
        match self {
            OwnedDataPhase::None => DataPhase::None,
            OwnedDataPhase::In { max_len } => DataPhase::In { max_len: *max_len },
            OwnedDataPhase::Out { bytes } => DataPhase::Out { bytes },
        }
    }
}

/// Move `*state` to `to`, rejecting the move if the §4.3 state table
/// (`EngineState::can_transition_to`) doesn't allow it.
fn transition(state: &mut EngineState, to: EngineState) -> Result<(), EngineError> {
    if !state.can_transition_to(to) {
        return Err(EngineError::PreconditionFailed(format!(
            "illegal state transition from {state:?} to {to:?}"
        )));
    }
    *state = to;
    Ok(())
}

/// Like [`transition`], but for call sites that compute `to` from a
/// result that's already been decided -- there's no reply to carry a
/// rejection back to, so log it instead of silently dropping it.
fn transition_or_warn(state: &mut EngineState, to: EngineState) {
    if let Err(e) = transition(state, to) {
        warn!(error = %e, "state transition rejected");
    }
}

enum ActorMessage {
    OpenSession {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    CloseSession {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Execute {
        code: u16,
        params: Vec<u32>,
        data_phase: OwnedDataPhase,
        reply: oneshot::Sender<Result<CommandOutcome, EngineError>>,
    },
    ListChildren {
        storage_id: u32,
        parent_handle: Option<u32>,
        reply: oneshot::Sender<Result<Vec<ObjectInfo>, FallbackAllFailed>>,
    },
    Shutdown,
}

/// A handle to a running per-device actor (§4.3, §9 "Actor-isolated
/// shared state"). Cloning shares the same underlying task; all
/// operations issued through any clone are serialized FIFO by the
/// actor's single message queue (§5 "Ordering guarantees").
#[derive(Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<ActorMessage>,
    events: Arc<broadcast::Sender<DeviceEvent>>,
}

impl DeviceHandle {
    /// Subscribe to this device's event stream. Slow subscribers drop
    /// the oldest undelivered events rather than block commands.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Send `OpenSession` and await the session becoming active.
    pub async fn open_session(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ActorMessage::OpenSession { reply }).await;
        rx.await.unwrap_or(Err(EngineError::Cancelled))
    }

    /// Send `CloseSession`.
    pub async fn close_session(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ActorMessage::CloseSession { reply }).await;
        rx.await.unwrap_or(Err(EngineError::Cancelled))
    }

    /// Execute one command through the actor's single-flight queue
    /// (§4.3 "Command execution algorithm").
    pub async fn execute(
        &self,
        code: u16,
        params: Vec<u32>,
        data_phase: OwnedDataPhase,
    ) -> Result<CommandOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ActorMessage::Execute {
            code,
            params,
            data_phase,
            reply,
        })
        .await;
        rx.await.unwrap_or(Err(EngineError::Cancelled))
    }

    /// List the children of `(storage_id, parent_handle)` via the
    /// enumeration ladder (§4.5).
    pub async fn list_children(
        &self,
        storage_id: u32,
        parent_handle: Option<u32>,
    ) -> Result<Vec<ObjectInfo>, FallbackAllFailed> {
        let (reply, rx) = oneshot::channel();
        self.send(ActorMessage::ListChildren {
            storage_id,
            parent_handle,
            reply,
        })
        .await;
        rx.await.unwrap_or(Err(FallbackAllFailed { attempts: vec![] }))
    }

    /// Ask the actor to close its link and stop. Does not wait for
    /// the task to finish.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ActorMessage::Shutdown).await;
    }

    async fn send(&self, msg: ActorMessage) {
        if self.tx.send(msg).await.is_err() {
            warn!("device actor no longer running");
        }
    }
}

/// Execute one command, retrying `Busy` responses per
/// `policy.tuning.busy_backoff` (§4.3 "Backoff & retry", §8 scenario S2).
async fn execute_with_busy_retry(
    link: &mut dyn UsbLink,
    session: &mut Session,
    policy: &DevicePolicy,
    code: u16,
    params: &[u32],
    data_phase: &OwnedDataPhase,
) -> Result<CommandOutcome, EngineError> {
    let mut attempt = 0;
    loop {
        let result = execute_command(link, session, policy, code, params, data_phase.borrow()).await;
        match result {
            Err(e) if is_busy(&e) && attempt < policy.tuning.busy_backoff.retries => {
                let delay = crate::backoff::delay_for_attempt(policy.tuning.busy_backoff, attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "busy, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn is_busy(e: &EngineError) -> bool {
    matches!(e, EngineError::Transport(mtp_errors::TransportError::Busy))
}

fn is_timeout(e: &EngineError) -> bool {
    matches!(
        e,
        EngineError::Transport(mtp_errors::TransportError::Timeout)
            | EngineError::Transport(mtp_errors::TransportError::TimeoutInPhase(_))
    )
}

/// Escalate a persistent `Timeout` per §4.3 "Backoff & retry": first
/// re-issue with a longer deadline, then close and reopen the session,
/// then issue a USB port reset -- stopping at the first stage that
/// stops timing out. Each stage still goes through
/// [`execute_with_busy_retry`], since a `Busy` response can show up at
/// any of them.
async fn execute_with_timeout_escalation(
    link: &mut dyn UsbLink,
    session: &mut Session,
    policy: &DevicePolicy,
    code: u16,
    params: &[u32],
    data_phase: &OwnedDataPhase,
) -> Result<CommandOutcome, EngineError> {
    let first = execute_with_busy_retry(link, session, policy, code, params, data_phase).await;
    if !matches!(&first, Err(e) if is_timeout(e)) {
        return first;
    }

    warn!(code, "timeout, re-issuing with a longer deadline");
    let mut escalated = policy.clone();
    escalated.tuning.io_timeout_ms = escalated.tuning.io_timeout_ms.saturating_mul(2);
    let second = execute_with_busy_retry(link, session, &escalated, code, params, data_phase).await;
    if !matches!(&second, Err(e) if is_timeout(e)) {
        return second;
    }

    warn!(code, "timeout persisted, closing and reopening the session");
    let session_id = session.session_id.max(1);
    let _ = execute_command(link, session, policy, ptp_wire::opcodes::CLOSE_SESSION, &[], DataPhase::None).await;
    *session = Session::open(session_id);
    execute_command(link, session, policy, ptp_wire::opcodes::OPEN_SESSION, &[session_id], DataPhase::None).await?;
    let third = execute_with_busy_retry(link, session, &escalated, code, params, data_phase).await;
    if !matches!(&third, Err(e) if is_timeout(e)) {
        return third;
    }

    warn!(code, "timeout persisted after session reset, issuing a usb port reset");
    link.reset_device().await.map_err(EngineError::Transport)?;
    *session = Session::open(session_id);
    execute_command(link, session, policy, ptp_wire::opcodes::OPEN_SESSION, &[session_id], DataPhase::None).await?;
    execute_with_busy_retry(link, session, &escalated, code, params, data_phase).await
}

/// Spawn the per-device actor task owning `link`, and return a handle
/// to it. The task runs until `shutdown()` is called or every handle
/// is dropped.
pub fn spawn(
    mut link: Box<dyn UsbLink>,
    summary: DeviceSummary,
    open_opts: OpenOptions,
    mut policy: DevicePolicy,
    resolver: Arc<QuirkResolver>,
    fingerprint: String,
) -> DeviceHandle {
    let (tx, mut rx) = mpsc::channel::<ActorMessage>(32);
    let (events_tx, _events_rx) = events::channel();
    let events_tx = Arc::new(events_tx);

    tokio::spawn(async move {
        let mut state = EngineState::Disconnected;
        let mut session = Session::closed();

        if let Err(e) = link.open(&summary, open_opts).await {
            warn!(error = %e, "failed to open usb link for device actor");
            return;
        }
        transition(&mut state, EngineState::Attached).expect("Disconnected -> Attached is always legal");
        info!(fingerprint = %fingerprint, "device actor attached");

        while let Some(msg) = rx.recv().await {
            match msg {
                ActorMessage::OpenSession { reply } => {
                    if state != EngineState::Attached {
                        let _ = reply.send(Err(EngineError::PreconditionFailed(
                            "session already opening or open".into(),
                        )));
                        continue;
                    }
                    if let Err(e) = transition(&mut state, EngineState::SessionOpening) {
                        let _ = reply.send(Err(e));
                        continue;
                    }
                    session = Session::open(1);
                    let result = execute_command(
                        link.as_mut(),
                        &mut session,
                        &policy,
                        ptp_wire::opcodes::OPEN_SESSION,
                        &[session.session_id],
                        DataPhase::None,
                    )
                    .await;
                    match result {
                        Ok(_) => {
                            transition_or_warn(&mut state, EngineState::SessionActive);
                            let _ = reply.send(Ok(()));
                        }
                        Err(EngineError::Protocol(mtp_errors::ProtocolError::SessionAlreadyOpen)) => {
                            transition_or_warn(&mut state, EngineState::SessionActive);
                            let _ = reply.send(Ok(()));
                        }
                        Err(e) => {
                            transition_or_warn(&mut state, EngineState::Attached);
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                ActorMessage::CloseSession { reply } => {
                    if state != EngineState::SessionActive {
                        let _ = reply.send(Err(EngineError::PreconditionFailed(
                            "no active session".into(),
                        )));
                        continue;
                    }
                    if let Err(e) = transition(&mut state, EngineState::SessionClosing) {
                        let _ = reply.send(Err(e));
                        continue;
                    }
                    let result = execute_command(
                        link.as_mut(),
                        &mut session,
                        &policy,
                        ptp_wire::opcodes::CLOSE_SESSION,
                        &[],
                        DataPhase::None,
                    )
                    .await;
                    transition_or_warn(&mut state, EngineState::Attached);
                    let _ = reply.send(result.map(|_| ()));
                }
                ActorMessage::Execute {
                    code,
                    params,
                    data_phase,
                    reply,
                } => {
                    if state != EngineState::SessionActive {
                        let _ = reply.send(Err(EngineError::PreconditionFailed(
                            "no active session".into(),
                        )));
                        continue;
                    }
                    if let Err(e) = transition(&mut state, EngineState::CommandInFlight) {
                        let _ = reply.send(Err(e));
                        continue;
                    }
                    let result = execute_with_timeout_escalation(
                        link.as_mut(),
                        &mut session,
                        &policy,
                        code,
                        &params,
                        &data_phase,
                    )
                    .await;
                    // §4.3: disconnect mid-phase lands in Attached, not Disconnected;
                    // Disconnected is only entered by an explicit close.
                    let next = if matches!(result, Err(EngineError::Transport(mtp_errors::TransportError::NoDevice))) {
                        EngineState::Attached
                    } else {
                        EngineState::SessionActive
                    };
                    transition_or_warn(&mut state, next);
                    let _ = reply.send(result);
                }
                ActorMessage::ListChildren {
                    storage_id,
                    parent_handle,
                    reply,
                } => {
                    if state != EngineState::SessionActive {
                        let _ = reply.send(Err(FallbackAllFailed { attempts: vec![] }));
                        continue;
                    }
                    if transition(&mut state, EngineState::CommandInFlight).is_err() {
                        let _ = reply.send(Err(FallbackAllFailed { attempts: vec![] }));
                        continue;
                    }
                    let result = list_children(
                        link.as_mut(),
                        &mut session,
                        &mut policy,
                        &resolver,
                        &fingerprint,
                        storage_id,
                        parent_handle,
                    )
                    .await;
                    transition_or_warn(&mut state, EngineState::SessionActive);
                    let _ = reply.send(result);
                }
                ActorMessage::Shutdown => {
                    link.close().await;
                    // Disconnected's entry is "initial / after close" (§4.3) --
                    // an explicit close resets state from wherever it was, not
                    // a transition the table governs.
                    state = EngineState::Disconnected;
                    break;
                }
            }
        }
        info!(fingerprint = %fingerprint, "device actor stopped");
    });

    DeviceHandle {
        tx,
        events: events_tx,
    }
}
