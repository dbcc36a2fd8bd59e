//! The tagged error taxonomy shared by every layer of the MTP host
//! stack, plus the bookkeeping types used by the fallback-ladder
//! primitive (§4.10) to report what it tried.
//!
//! Every fallible operation in this workspace returns `Result<T, E>`
//! with `E` built from the variants here -- there is no
//! `Box<dyn Error>` erasure inside library crates; only an embedding
//! binary is expected to flatten these for display.

#![warn(missing_docs)]

use std::time::Duration;
use thiserror::Error;

/// Which USB phase of a command a timeout happened in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Writing the command or data-out phase.
    BulkOut,
    /// Reading a data-in phase.
    BulkIn,
    /// Waiting for the response container.
    ResponseWait,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::BulkOut => "bulk-out",
            Phase::BulkIn => "bulk-in",
            Phase::ResponseWait => "response-wait",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the USB link (§4.2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device is no longer present on the bus.
    #[error("device no longer present")]
    NoDevice,
    /// The OS denied access to the device or interface.
    #[error("access denied opening device")]
    AccessDenied,
    /// A generic timeout with no specific phase attached.
    #[error("operation timed out")]
    Timeout,
    /// A timeout in a specific phase of a command.
    #[error("timed out during {0}")]
    TimeoutInPhase(Phase),
    /// The device is busy and the operation should be retried.
    #[error("device busy")]
    Busy,
    /// An endpoint stalled and could not be cleared a second time.
    #[error("endpoint stalled")]
    Stall,
    /// An underlying I/O error from the OS USB stack.
    #[error("usb i/o error: {0}")]
    Io(String),
}

/// Errors returned in a PTP RESPONSE container, or synthesized by the
/// protocol engine while interpreting one (§4.3 step 6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// `OperationNotSupported` (0x2005) for the named opcode.
    #[error("operation 0x{0:04x} not supported by device")]
    NotSupported(u16),
    /// `ObjectNotFound` (0x2009).
    #[error("object not found")]
    ObjectNotFound,
    /// `StoreFull` (0x200D).
    #[error("storage is full")]
    StoreFull,
    /// `ObjectWriteProtected` (0x2017).
    #[error("object or folder is write-protected")]
    ObjectWriteProtected,
    /// `SessionAlreadyOpen` (0x201E) -- recoverable in place.
    #[error("session already open")]
    SessionAlreadyOpen,
    /// `AccessDenied` (0x201D) returned by the device itself.
    #[error("device refused access")]
    AccessDeniedByDevice,
    /// Any other non-OK response code.
    #[error("protocol error, response code 0x{code:04x}{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Generic {
        /// The raw PTP response code.
        code: u16,
        /// An optional human-readable elaboration.
        message: Option<String>,
    },
    /// The response's transaction ID did not match the command's.
    #[error("protocol desynchronized: transaction ID mismatch")]
    Desync,
}

/// Errors originating in the protocol engine itself, above the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A transport-layer failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A protocol-layer failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A precondition the caller was responsible for was not met.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// A post-transfer verification (e.g. content hash) failed.
    #[error("verification failed: expected {expected}, got {actual}")]
    VerificationFailed {
        /// What was expected.
        expected: String,
        /// What was actually observed.
        actual: String,
    },
    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
    /// Every rung of a fallback ladder failed.
    #[error(transparent)]
    Fallback(#[from] FallbackAllFailed),
}

/// How an error should be handled by a retrying caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Retry in place, subject to policy (busy-backoff, timeout escalation).
    Transient,
    /// Retry only after a specific recovery action (clear stall, reset session).
    Recoverable,
    /// Surface to the caller; retrying without a state change will not help.
    Permanent,
}

impl TransportError {
    /// Classify this error per §7.
    pub fn classify(&self) -> Classification {
        match self {
            TransportError::Timeout | TransportError::TimeoutInPhase(_) | TransportError::Busy => {
                Classification::Transient
            }
            TransportError::Stall => Classification::Recoverable,
            TransportError::NoDevice | TransportError::AccessDenied | TransportError::Io(_) => {
                Classification::Permanent
            }
        }
    }
}

impl ProtocolError {
    /// Classify this error per §7.
    pub fn classify(&self) -> Classification {
        match self {
            ProtocolError::SessionAlreadyOpen => Classification::Transient,
            ProtocolError::Desync => Classification::Recoverable,
            ProtocolError::ObjectNotFound
            | ProtocolError::StoreFull
            | ProtocolError::ObjectWriteProtected
            | ProtocolError::AccessDeniedByDevice
            | ProtocolError::NotSupported(_)
            | ProtocolError::Generic { .. } => Classification::Permanent,
        }
    }

    /// A short, user-facing recovery suggestion, when one exists.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProtocolError::ObjectWriteProtected => {
                Some("target folder is not writable")
            }
            ProtocolError::StoreFull => Some("free up space on the device"),
            ProtocolError::ObjectNotFound => {
                Some("the object may have been deleted on the device")
            }
            _ => None,
        }
    }
}

impl EngineError {
    /// Classify this error per §7, delegating to the wrapped variant
    /// where one exists.
    pub fn classify(&self) -> Classification {
        match self {
            EngineError::Transport(e) => e.classify(),
            EngineError::Protocol(e) => e.classify(),
            EngineError::PreconditionFailed(_)
            | EngineError::VerificationFailed { .. }
            | EngineError::Cancelled
            | EngineError::Fallback(_) => Classification::Permanent,
        }
    }

    /// A short, user-facing recovery suggestion, when one exists.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            EngineError::Protocol(e) => e.recovery_suggestion(),
            _ => None,
        }
    }
}

/// One rung's outcome, as recorded by the fallback ladder executor
/// (§4.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// The rung's name, e.g. `"get_object_prop_list"`.
    pub name: String,
    /// How long the attempt took.
    pub duration: Duration,
    /// Whether the rung succeeded.
    pub succeeded: bool,
    /// The error's `Display` string, present iff `!succeeded`.
    pub error: Option<String>,
}

/// Returned when every rung of a fallback ladder failed (§4.10, §8
/// invariant 9).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct FallbackAllFailed {
    /// One entry per rung attempted, in attempt order.
    pub attempts: Vec<Attempt>,
}

impl std::fmt::Display for FallbackAllFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "all {} fallback rungs failed:", self.attempts.len())?;
        for a in &self.attempts {
            let mark = if a.succeeded { '\u{2713}' } else { '\u{2717}' };
            write!(
                f,
                "  {mark} {} ({} ms)",
                a.name,
                a.duration.as_millis()
            )?;
            if let Some(e) = &a.error {
                write!(f, ": {e}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_classify_correctly() {
        assert_eq!(TransportError::Busy.classify(), Classification::Transient);
        assert_eq!(TransportError::Timeout.classify(), Classification::Transient);
        assert_eq!(
            ProtocolError::SessionAlreadyOpen.classify(),
            Classification::Transient
        );
    }

    #[test]
    fn recoverable_errors_classify_correctly() {
        assert_eq!(TransportError::Stall.classify(), Classification::Recoverable);
        assert_eq!(ProtocolError::Desync.classify(), Classification::Recoverable);
    }

    #[test]
    fn permanent_errors_classify_correctly() {
        assert_eq!(TransportError::NoDevice.classify(), Classification::Permanent);
        assert_eq!(
            ProtocolError::ObjectNotFound.classify(),
            Classification::Permanent
        );
    }

    #[test]
    fn write_protected_has_a_suggestion() {
        let e = ProtocolError::ObjectWriteProtected;
        assert_eq!(
            e.recovery_suggestion(),
            Some("target folder is not writable")
        );
    }

    #[test]
    fn fallback_failed_lists_every_attempt() {
        let err = FallbackAllFailed {
            attempts: vec![
                Attempt {
                    name: "get_object_prop_list".into(),
                    duration: Duration::from_millis(5),
                    succeeded: false,
                    error: Some("not supported".into()),
                },
                Attempt {
                    name: "get_object_handles".into(),
                    duration: Duration::from_millis(12),
                    succeeded: false,
                    error: Some("timeout".into()),
                },
            ],
        };
        let s = err.to_string();
        assert!(s.contains("get_object_prop_list"));
        assert!(s.contains("get_object_handles"));
        assert!(s.contains('\u{2717}'));
    }
}
