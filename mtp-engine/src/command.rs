use std::time::Duration;

use mtp_errors::{EngineError, Phase, ProtocolError, TransportError};
use ptp_wire::{decode_container, encode_command, ContainerKind, WireError};
use usb_link::UsbLink;

use crate::state::Session;
use mtp_quirks::DevicePolicy;

/// What a command's data phase looks like, from the caller's side
/// (§4.3 step 2-4). A command with neither variant has no data phase.
pub enum DataPhase<'a> {
    /// No data phase.
    None,
    /// The command expects a DATA container inbound; `max_len` bounds
    /// the buffer used to read it.
    In {
        /// Maximum payload size accepted.
        max_len: usize,
    },
    /// The command pumps this payload outbound as one or more DATA
    /// containers, chunked to `policy.tuning.max_chunk_bytes` (§4.3
    /// step 3). One container header governs the whole phase, as it
    /// does on the wire; chunking is purely a bulk-transfer detail.
    Out {
        /// The full payload to send.
        bytes: &'a [u8],
    },
}

/// The result of a successful `execute_command` (§4.3 step 6, the
/// `0x2001` outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Response parameters, if any.
    pub params: Vec<u32>,
    /// The data phase payload received, if `DataPhase::In` was requested.
    pub data_in: Option<Vec<u8>>,
}

fn response_to_outcome(code: u16, params: Vec<u32>, data_in: Option<Vec<u8>>) -> Result<CommandOutcome, EngineError> {
    match code {
        ptp_wire::opcodes::RESP_OK => Ok(CommandOutcome { params, data_in }),
        ptp_wire::opcodes::RESP_OPERATION_NOT_SUPPORTED => {
            Err(EngineError::Protocol(ProtocolError::NotSupported(code)))
        }
        ptp_wire::opcodes::RESP_OBJECT_NOT_FOUND => Err(EngineError::Protocol(ProtocolError::ObjectNotFound)),
        ptp_wire::opcodes::RESP_STORE_FULL => Err(EngineError::Protocol(ProtocolError::StoreFull)),
        ptp_wire::opcodes::RESP_OBJECT_WRITE_PROTECTED => {
            Err(EngineError::Protocol(ProtocolError::ObjectWriteProtected))
        }
        ptp_wire::opcodes::RESP_SESSION_ALREADY_OPEN => {
            Err(EngineError::Protocol(ProtocolError::SessionAlreadyOpen))
        }
        ptp_wire::opcodes::RESP_ACCESS_DENIED => {
            Err(EngineError::Protocol(ProtocolError::AccessDeniedByDevice))
        }
        other => Err(EngineError::Protocol(ProtocolError::Generic {
            code: other,
            message: None,
        })),
    }
}

fn wire_err_to_engine(e: WireError) -> EngineError {
    EngineError::Protocol(ProtocolError::Generic {
        code: 0,
        message: Some(e.to_string()),
    })
}

/// Execute one PTP command end-to-end against `link` (§4.3 "Command
/// execution algorithm"). Assigns and advances `session`'s txid,
/// writes the command, pumps or reads the data phase, reads the
/// response, and maps the response code to an outcome.
pub async fn execute_command(
    link: &mut dyn UsbLink,
    session: &mut Session,
    policy: &DevicePolicy,
    code: u16,
    params: &[u32],
    data_phase: DataPhase<'_>,
) -> Result<CommandOutcome, EngineError> {
    let txid = session.next_txid();
    let io_timeout = Duration::from_millis(policy.tuning.io_timeout_ms);

    let command_bytes = encode_command(code, txid, params);
    link.bulk_out(&command_bytes, io_timeout)
        .await
        .map_err(|e| phase_err(e, Phase::BulkOut))?;

    if let DataPhase::Out { bytes } = &data_phase {
        let chunk_size = policy.tuning.max_chunk_bytes.max(1) as usize;
        let header = ptp_wire::encode_data_header(code, txid, bytes.len());
        link.bulk_out(&header, io_timeout)
            .await
            .map_err(|e| phase_err(e, Phase::BulkOut))?;
        for chunk in bytes.chunks(chunk_size) {
            link.bulk_out(chunk, io_timeout)
                .await
                .map_err(|e| phase_err(e, Phase::BulkOut))?;
        }
    }

    let mut data_in = None;
    if let DataPhase::In { max_len } = data_phase {
        let mut buf = vec![0u8; max_len.max(ptp_wire::HEADER_LEN)];
        let n = read_with_stall_recovery(link, &mut buf, io_timeout, Phase::BulkIn).await?;
        let container = decode_container(&buf[..n], max_len as u32).map_err(wire_err_to_engine)?;
        match container.kind {
            ContainerKind::Data => {
                if container.txid != txid {
                    return Err(EngineError::Protocol(ProtocolError::Desync));
                }
                data_in = Some(container.payload);
            }
            ContainerKind::Response => {
                if container.txid != txid {
                    return Err(EngineError::Protocol(ProtocolError::Desync));
                }
                return response_to_outcome(container.code, container.params, None);
            }
            _ => return Err(EngineError::Protocol(ProtocolError::Desync)),
        }
    }

    let mut resp_buf = vec![0u8; ptp_wire::HEADER_LEN + ptp_wire::MAX_PARAMS * 4];
    let n = read_with_stall_recovery(link, &mut resp_buf, io_timeout, Phase::ResponseWait).await?;
    let response = decode_container(&resp_buf[..n], resp_buf.len() as u32).map_err(wire_err_to_engine)?;

    if response.kind != ContainerKind::Response {
        return Err(EngineError::Protocol(ProtocolError::Desync));
    }
    if response.txid != txid {
        return Err(EngineError::Protocol(ProtocolError::Desync));
    }

    response_to_outcome(response.code, response.params, data_in)
}

fn phase_err(e: TransportError, phase: Phase) -> EngineError {
    match e {
        TransportError::Timeout => EngineError::Transport(TransportError::TimeoutInPhase(phase)),
        other => EngineError::Transport(other),
    }
}

/// Read a bulk-in phase, transparently clearing a single stall and
/// retrying once (§4.2, §8 invariant 10): a second consecutive stall
/// surfaces as `Stall`.
async fn read_with_stall_recovery(
    link: &mut dyn UsbLink,
    buf: &mut [u8],
    timeout: Duration,
    phase: Phase,
) -> Result<usize, EngineError> {
    match link.bulk_in(buf, timeout).await {
        Ok(n) => Ok(n),
        Err(TransportError::Stall) => {
            tracing::debug!(?phase, "bulk-in stall, clearing and retrying once");
            link.clear_stall(0x81)
                .await
                .map_err(EngineError::Transport)?;
            link.bulk_in(buf, timeout)
                .await
                .map_err(|e| phase_err(e, phase))
        }
        Err(e) => Err(phase_err(e, phase)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtp_quirks::DevicePolicy;
    use usb_link::{DeviceSummary, OpenOptions, ScriptedReply, VirtualLink};

    fn summary() -> DeviceSummary {
        DeviceSummary {
            id: "1".into(),
            vendor_id: 1,
            product_id: 2,
            bus: None,
            address: None,
            manufacturer: None,
            model: None,
            interface_class: 6,
            interface_subclass: 1,
            interface_protocol: 1,
            bcd_device: 0,
        }
    }

    #[tokio::test]
    async fn open_session_happy_path() {
        let mut link = VirtualLink::new();
        link.open(&summary(), OpenOptions::default()).await.unwrap();
        // OpenSession has no data phase; response carries no params.
        let response = encode_response(ptp_wire::opcodes::RESP_OK, 1, &[]);
        link.queue_bulk_in(ScriptedReply::Bytes(response));

        let mut session = Session::closed();
        let policy = DevicePolicy::default();
        let outcome = execute_command(
            &mut link,
            &mut session,
            &policy,
            ptp_wire::opcodes::OPEN_SESSION,
            &[1],
            DataPhase::None,
        )
        .await
        .unwrap();
        assert!(outcome.data_in.is_none());
    }

    #[tokio::test]
    async fn stall_is_cleared_and_retried_transparently() {
        let mut link = VirtualLink::new();
        link.open(&summary(), OpenOptions::default()).await.unwrap();
        link.queue_bulk_in(ScriptedReply::Err(TransportError::Stall));
        let response = encode_response(ptp_wire::opcodes::RESP_OK, 1, &[]);
        link.queue_bulk_in(ScriptedReply::Bytes(response));

        let mut session = Session::closed();
        let policy = DevicePolicy::default();
        let outcome = execute_command(
            &mut link,
            &mut session,
            &policy,
            ptp_wire::opcodes::GET_STORAGE_IDS,
            &[],
            DataPhase::None,
        )
        .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn txid_mismatch_surfaces_as_desync() {
        let mut link = VirtualLink::new();
        link.open(&summary(), OpenOptions::default()).await.unwrap();
        let response = encode_response(ptp_wire::opcodes::RESP_OK, 999, &[]);
        link.queue_bulk_in(ScriptedReply::Bytes(response));

        let mut session = Session::closed();
        let policy = DevicePolicy::default();
        let err = execute_command(
            &mut link,
            &mut session,
            &policy,
            ptp_wire::opcodes::GET_STORAGE_IDS,
            &[],
            DataPhase::None,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Protocol(ProtocolError::Desync)
        ));
    }

    #[tokio::test]
    async fn not_supported_response_maps_to_protocol_error() {
        let mut link = VirtualLink::new();
        link.open(&summary(), OpenOptions::default()).await.unwrap();
        let response = encode_response(ptp_wire::opcodes::RESP_OPERATION_NOT_SUPPORTED, 1, &[]);
        link.queue_bulk_in(ScriptedReply::Bytes(response));

        let mut session = Session::closed();
        let policy = DevicePolicy::default();
        let err = execute_command(
            &mut link,
            &mut session,
            &policy,
            ptp_wire::opcodes::GET_OBJECT_PROP_LIST,
            &[],
            DataPhase::None,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Protocol(ProtocolError::NotSupported(_))
        ));
    }

    fn encode_response(code: u16, txid: u32, params: &[u32]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ptp_wire::HEADER_LEN + params.len() * 4);
        let len = (ptp_wire::HEADER_LEN + params.len() * 4) as u32;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&3u16.to_le_bytes());
        buf.extend_from_slice(&code.to_le_bytes());
        buf.extend_from_slice(&txid.to_le_bytes());
        for p in params {
            buf.extend_from_slice(&p.to_le_bytes());
        }
        buf
    }
}
