use super::*;

#[test]
fn encodes_command_with_no_params() {
    let bytes = encode_command(opcodes::GET_DEVICE_INFO, 0, &[]);
    assert_eq!(bytes.len(), HEADER_LEN);
    assert_eq!(&bytes[0..4], &12u32.to_le_bytes());
    assert_eq!(&bytes[4..6], &1u16.to_le_bytes());
    assert_eq!(&bytes[6..8], &opcodes::GET_DEVICE_INFO.to_le_bytes());
    assert_eq!(&bytes[8..12], &0u32.to_le_bytes());
}

#[test]
fn encodes_command_with_params() {
    let bytes = encode_command(opcodes::GET_STORAGE_INFO, 7, &[0x1001_0001]);
    assert_eq!(bytes.len(), HEADER_LEN + 4);
    let round = decode_container(&bytes, 4096).unwrap();
    assert_eq!(round.kind, ContainerKind::Command);
    assert_eq!(round.txid, 7);
    assert_eq!(round.params, vec![0x1001_0001]);
}

#[test]
#[should_panic]
fn refuses_too_many_params() {
    encode_command(0x1234, 1, &[1, 2, 3, 4, 5, 6]);
}

#[test]
fn round_trips_response_params() {
    let bytes = encode_command(opcodes::RESP_OK, 3, &[1, 2, 3]);
    let c = decode_container(&bytes, 4096).unwrap();
    // encode_command doesn't know about "response" vs "command" kind;
    // the kind lives in the header's type field, which callers set by
    // constructing the container directly when they need Response.
    assert_eq!(c.kind, ContainerKind::Command);
    assert_eq!(c.params, vec![1, 2, 3]);
}

#[test]
fn decodes_data_header_and_trailing_payload() {
    let header = encode_data_header(opcodes::GET_OBJECT, 42, 5);
    let mut bytes = header.to_vec();
    bytes.extend_from_slice(b"hello");
    let c = decode_container(&bytes, 4096).unwrap();
    assert_eq!(c.kind, ContainerKind::Data);
    assert_eq!(c.code, opcodes::GET_OBJECT);
    assert_eq!(c.txid, 42);
    assert_eq!(c.payload, b"hello");
}

#[test]
fn rejects_truncated_header() {
    let err = decode_container(&[1, 2, 3], 4096).unwrap_err();
    assert_eq!(err, WireError::TruncatedHeader(3));
}

#[test]
fn rejects_length_below_header_size() {
    let mut bytes = vec![0u8; 12];
    bytes[0..4].copy_from_slice(&4u32.to_le_bytes());
    let err = decode_container(&bytes, 4096).unwrap_err();
    assert_eq!(
        err,
        WireError::MalformedContainer {
            declared: 4,
            max: 4096
        }
    );
}

#[test]
fn rejects_length_above_max_packet() {
    let mut bytes = vec![0u8; 12];
    bytes[0..4].copy_from_slice(&100_000u32.to_le_bytes());
    let err = decode_container(&bytes, 4096).unwrap_err();
    assert_eq!(
        err,
        WireError::MalformedContainer {
            declared: 100_000,
            max: 4096
        }
    );
}

#[test]
fn rejects_unknown_container_type() {
    let mut bytes = vec![0u8; 12];
    bytes[0..4].copy_from_slice(&12u32.to_le_bytes());
    bytes[4..6].copy_from_slice(&9u16.to_le_bytes());
    let err = decode_container(&bytes, 4096).unwrap_err();
    assert_eq!(err, WireError::UnknownType(9));
}

#[test]
fn rejects_overflowing_parameters() {
    let mut bytes = vec![0u8; 12 + 6 * 4];
    let len = bytes.len() as u32;
    bytes[0..4].copy_from_slice(&len.to_le_bytes());
    bytes[4..6].copy_from_slice(&1u16.to_le_bytes()); // Command
    let err = decode_container(&bytes, 4096).unwrap_err();
    assert_eq!(err, WireError::OverflowingParameters(6));
}
