use thiserror::Error;

/// Errors surfaced by the consumer-facing facade.
#[derive(Debug, Error)]
pub enum HostError {
    /// The named device has no registered actor, or is offline.
    #[error("device {0} is not attached")]
    DeviceOffline(String),
    /// A protocol-engine-layer failure.
    #[error(transparent)]
    Engine(#[from] mtp_errors::EngineError),
    /// An enumeration-ladder failure.
    #[error(transparent)]
    Fallback(#[from] mtp_errors::FallbackAllFailed),
    /// A transfer-journal failure.
    #[error(transparent)]
    Journal(#[from] mtp_journal::JournalError),
    /// A live-index failure.
    #[error(transparent)]
    Index(#[from] mtp_index::IndexError),
}
