use thiserror::Error;

use crate::record::TransferId;

/// Errors surfaced by the transfer journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The underlying SQLite database rejected an operation.
    #[error("journal database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// No record exists with the given id.
    #[error("no transfer record with id {0}")]
    NotFound(TransferId),
    /// The requested state transition is not permitted by the §4.6 DAG.
    #[error("illegal transfer state transition for record {id}")]
    IllegalTransition {
        /// The record the caller tried to transition.
        id: TransferId,
    },
    /// `committed_bytes` would exceed the declared `total_bytes`.
    #[error("committed_bytes {committed} exceeds total_bytes {total} for record {id}")]
    ProgressExceedsTotal {
        /// The record being updated.
        id: TransferId,
        /// The bytes the caller attempted to commit.
        committed: u64,
        /// The declared total.
        total: u64,
    },
}
