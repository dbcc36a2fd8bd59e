use thiserror::Error;

/// Length in bytes of the fixed PTP container header.
pub const HEADER_LEN: usize = 12;

/// Maximum number of `u32` parameters a command, response, or event
/// container may carry (USB Still Image Capture Device Definition
/// limits commands to five; we apply the same ceiling uniformly).
pub const MAX_PARAMS: usize = 5;

/// The four container kinds defined by the PTP transport layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum ContainerKind {
    /// A command issued by the host.
    Command = 1,
    /// A data-phase packet, either host-to-device or device-to-host.
    Data = 2,
    /// The device's response to a command.
    Response = 3,
    /// An asynchronous event delivered on the interrupt endpoint.
    Event = 4,
}

impl ContainerKind {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Self::Command),
            2 => Some(Self::Data),
            3 => Some(Self::Response),
            4 => Some(Self::Event),
            _ => None,
        }
    }
}

/// A decoded PTP container.
///
/// `params` is populated for [`ContainerKind::Command`],
/// [`ContainerKind::Response`], and [`ContainerKind::Event`]; `payload`
/// is populated for [`ContainerKind::Data`]. The two are never both
/// non-empty for a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtpContainer {
    /// Which of the four container kinds this is.
    pub kind: ContainerKind,
    /// The operation, response, or event code.
    pub code: u16,
    /// The transaction ID binding command/data/response together.
    pub txid: u32,
    /// Parameters, present on Command/Response/Event containers.
    pub params: Vec<u32>,
    /// Payload bytes, present on Data containers.
    pub payload: Vec<u8>,
}

/// Failures from encoding or decoding a container.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Fewer than [`HEADER_LEN`] bytes were available to decode.
    #[error("truncated PTP container header: got {0} bytes, need {HEADER_LEN}")]
    TruncatedHeader(usize),

    /// The declared `length` field was internally inconsistent: less
    /// than the header size, or greater than the caller's `max_packet`.
    #[error("malformed PTP container: declared length {declared} exceeds bounds (min {HEADER_LEN}, max {max})")]
    MalformedContainer {
        /// The `length` field read from the header.
        declared: u32,
        /// The caller-supplied ceiling on packet size.
        max: u32,
    },

    /// The container's `type` field did not match any known kind.
    #[error("unknown PTP container type {0}")]
    UnknownType(u16),

    /// A command/response/event container declared more trailing
    /// parameters than [`MAX_PARAMS`] permits.
    #[error("container declares {0} parameters, maximum is {MAX_PARAMS}")]
    OverflowingParameters(usize),
}

/// Encode a command container: header plus up to [`MAX_PARAMS`] `u32`
/// parameters.
///
/// # Panics
///
/// Panics if `params.len() > MAX_PARAMS`; the protocol engine is
/// expected never to construct a command with more.
pub fn encode_command(code: u16, txid: u32, params: &[u32]) -> Vec<u8> {
    assert!(params.len() <= MAX_PARAMS, "too many command parameters");
    let length = HEADER_LEN + params.len() * 4;
    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&(length as u32).to_le_bytes());
    buf.extend_from_slice(&(ContainerKind::Command as u16).to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&txid.to_le_bytes());
    for p in params {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    buf
}

/// Encode just the 12-byte header of a data-phase container.
///
/// The payload itself is not appended here: for large transfers the
/// USB link writes the announced `total_len` bytes as a sequence of
/// bulk-out transfers without re-wrapping each chunk in its own
/// header, so the header and the payload are produced separately.
pub fn encode_data_header(code: u16, txid: u32, total_len: usize) -> [u8; HEADER_LEN] {
    let length = (HEADER_LEN + total_len) as u32;
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&length.to_le_bytes());
    buf[4..6].copy_from_slice(&(ContainerKind::Data as u16).to_le_bytes());
    buf[6..8].copy_from_slice(&code.to_le_bytes());
    buf[8..12].copy_from_slice(&txid.to_le_bytes());
    buf
}

/// Decode a complete container from `bytes`.
///
/// `max_packet` bounds the declared `length` field, guarding against a
/// device reporting an absurd size before any data has actually been
/// read.
pub fn decode_container(
    bytes: &[u8],
    max_packet: u32,
) -> Result<PtpContainer, WireError> {
    if bytes.len() < HEADER_LEN {
        return Err(WireError::TruncatedHeader(bytes.len()));
    }

    let length = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if (length as usize) < HEADER_LEN || length > max_packet {
        return Err(WireError::MalformedContainer {
            declared: length,
            max: max_packet,
        });
    }

    let type_field = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    let kind = ContainerKind::from_u16(type_field)
        .ok_or(WireError::UnknownType(type_field))?;
    let code = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
    let txid = u32::from_le_bytes(bytes[8..12].try_into().unwrap());

    let avail = bytes.len().min(length as usize);
    let tail = &bytes[HEADER_LEN..avail];

    match kind {
        ContainerKind::Data => Ok(PtpContainer {
            kind,
            code,
            txid,
            params: Vec::new(),
            payload: tail.to_vec(),
        }),
        ContainerKind::Command | ContainerKind::Response | ContainerKind::Event => {
            if tail.len() % 4 != 0 {
                return Err(WireError::OverflowingParameters(
                    tail.len() / 4 + 1,
                ));
            }
            let n = tail.len() / 4;
            if n > MAX_PARAMS {
                return Err(WireError::OverflowingParameters(n));
            }
            let params = tail
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(PtpContainer {
                kind,
                code,
                txid,
                params,
                payload: Vec::new(),
            })
        }
    }
}
