use async_trait::async_trait;
use mtp_engine::{DeviceHandle, OwnedDataPhase};
use mtp_journal::{Journal, TransferId};
use ptp_wire::opcodes;

use crate::error::HostError;

/// Default chunk size for `GetPartialObject`/`SendObject` pumping,
/// used when no device-specific tuning is available to the facade
/// (§6 tuning default `max_chunk_bytes`).
pub const DEFAULT_CHUNK_BYTES: u32 = 4 * 1024 * 1024;

/// A source of outbound bytes for `write_object`: the facade pumps
/// `SendObject` chunks by polling this until it returns `None`.
#[async_trait]
pub trait ChunkSource: Send {
    /// Return up to `max_len` bytes, or `None` at end of stream.
    async fn next_chunk(&mut self, max_len: usize) -> std::io::Result<Option<Vec<u8>>>;
}

/// Reads one object's content in chunks via `GetPartialObject`,
/// updating the transfer journal's `committed_bytes` after each
/// chunk (§4.6 `update_progress`).
///
/// `GetPartialObject`'s offset/length parameters are `u32`, the
/// classic PTP limitation; objects over 4 GiB are out of scope for
/// this operation.
pub struct ObjectReader {
    device: DeviceHandle,
    journal: Journal,
    transfer_id: TransferId,
    handle: u32,
    total_bytes: u64,
    offset: u64,
    chunk_bytes: u32,
    finished: bool,
}

impl ObjectReader {
    pub(crate) fn new(device: DeviceHandle, journal: Journal, transfer_id: TransferId, handle: u32, total_bytes: u64) -> Self {
        ObjectReader {
            device,
            journal,
            transfer_id,
            handle,
            total_bytes,
            offset: 0,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            finished: false,
        }
    }

    /// The total size this reader was opened against.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Read the next chunk, or `None` once every byte has been read
    /// (the journal entry is marked `complete` on that final call).
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, HostError> {
        if self.finished {
            return Ok(None);
        }
        if self.offset >= self.total_bytes {
            self.journal.complete(self.transfer_id)?;
            self.finished = true;
            return Ok(None);
        }
        let remaining = self.total_bytes - self.offset;
        let want = remaining.min(self.chunk_bytes as u64) as u32;
        let outcome = self
            .device
            .execute(
                opcodes::GET_PARTIAL_OBJECT,
                vec![self.handle, self.offset as u32, want],
                OwnedDataPhase::In { max_len: want as usize + ptp_wire::HEADER_LEN },
            )
            .await?;
        let bytes = outcome.data_in.unwrap_or_default();
        if bytes.is_empty() {
            self.journal.fail(self.transfer_id, "device returned no data before end of file")?;
            self.finished = true;
            return Ok(None);
        }
        self.offset += bytes.len() as u64;
        self.journal.update_progress(self.transfer_id, self.offset)?;
        Ok(Some(bytes))
    }
}

/// Drain `source` into memory and issue one `SendObject` command.
///
/// `DataPhase::Out` is one PTP transaction: the engine pumps it in
/// `policy.tuning.max_chunk_bytes`-sized USB packets under a single
/// txid (§4.3 step 3), so the whole payload has to be assembled
/// before the call -- there is no partial-transaction progress to
/// report mid-flight, only before and after.
pub(crate) async fn pump_write(
    device: &DeviceHandle,
    journal: &Journal,
    transfer_id: TransferId,
    remote_handle_slot: &mut Option<u32>,
    new_handle: u32,
    total_bytes: u64,
    source: &mut dyn ChunkSource,
) -> Result<(), HostError> {
    journal.record_remote_handle(transfer_id, new_handle)?;
    *remote_handle_slot = Some(new_handle);

    let mut payload = Vec::with_capacity(total_bytes as usize);
    while let Some(chunk) = source
        .next_chunk(DEFAULT_CHUNK_BYTES as usize)
        .await
        .map_err(|e| mtp_errors::EngineError::PreconditionFailed(format!("reading source: {e}")))?
    {
        if chunk.is_empty() {
            break;
        }
        payload.extend_from_slice(&chunk);
    }

    if payload.len() as u64 != total_bytes {
        journal.fail(transfer_id, &format!("short write: {}/{} bytes", payload.len(), total_bytes))?;
        return Err(mtp_errors::EngineError::VerificationFailed {
            expected: total_bytes.to_string(),
            actual: payload.len().to_string(),
        }
        .into());
    }

    device
        .execute(opcodes::SEND_OBJECT, vec![], OwnedDataPhase::Out { bytes: payload })
        .await?;
    journal.update_progress(transfer_id, total_bytes)?;
    journal.complete(transfer_id)?;
    Ok(())
}
