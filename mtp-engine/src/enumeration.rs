use std::time::Instant;

use mtp_errors::{Attempt, EngineError, FallbackAllFailed, ProtocolError};
use mtp_quirks::QuirkResolver;
use ptp_wire::opcodes;
use usb_link::UsbLink;

use crate::command::{execute_command, DataPhase};
use crate::state::Session;
use mtp_quirks::DevicePolicy;

/// One child object as surfaced by either enumeration rung (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object handle.
    pub handle: u32,
    /// Parent handle, if reported.
    pub parent_handle: Option<u32>,
    /// Object name.
    pub name: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// PTP object format code.
    pub format_code: u16,
}

/// List the children of `(storage_id, parent_handle)` via the
/// standard ladder (§4.5): `get_object_prop_list` when the policy
/// trusts it, falling back to `get_object_handles` + per-handle
/// `get_object_info`, falling back to a session-recovery retry of the
/// handles path.
///
/// This hand-rolls the same `{name, duration, succeeded, error}`
/// bookkeeping [`crate::ladder::execute`] does generically: every rung
/// here needs the *same* `&mut link`/`&mut session` at once, which the
/// closure-based executor can't borrow three ways simultaneously, so
/// enumeration runs its rungs as a straight-line sequence instead.
///
/// `fingerprint` is used to record the auto-demotion against the
/// resolver's learned profile if the proplist rung reports
/// `OperationNotSupported` (§4.4 "Auto-demotion", §8 invariant 8).
pub async fn list_children(
    link: &mut dyn UsbLink,
    session: &mut Session,
    policy: &mut DevicePolicy,
    resolver: &QuirkResolver,
    fingerprint: &str,
    storage_id: u32,
    parent_handle: Option<u32>,
) -> Result<Vec<ObjectInfo>, FallbackAllFailed> {
    let parent_param = parent_handle.unwrap_or(0xFFFF_FFFF);
    let mut attempts = Vec::with_capacity(3);

    if policy.supports_get_object_prop_list {
        let start = Instant::now();
        match get_prop_list(link, session, policy, storage_id, parent_param).await {
            Ok(infos) => {
                attempts.push(Attempt {
                    name: "get_object_prop_list".into(),
                    duration: start.elapsed(),
                    succeeded: true,
                    error: None,
                });
                return Ok(infos);
            }
            Err(EngineError::Protocol(ProtocolError::NotSupported(_))) => {
                resolver.demote_object_prop_list(fingerprint);
                policy.supports_get_object_prop_list = false;
                attempts.push(Attempt {
                    name: "get_object_prop_list".into(),
                    duration: start.elapsed(),
                    succeeded: false,
                    error: Some("operation not supported".into()),
                });
            }
            Err(e) => {
                attempts.push(Attempt {
                    name: "get_object_prop_list".into(),
                    duration: start.elapsed(),
                    succeeded: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let start = Instant::now();
    match get_handles_then_infos(link, session, policy, storage_id, parent_param).await {
        Ok(infos) => {
            attempts.push(Attempt {
                name: "get_object_handles".into(),
                duration: start.elapsed(),
                succeeded: true,
                error: None,
            });
            return Ok(infos);
        }
        Err(e) => attempts.push(Attempt {
            name: "get_object_handles".into(),
            duration: start.elapsed(),
            succeeded: false,
            error: Some(e.to_string()),
        }),
    }

    let start = Instant::now();
    match recover_and_retry(link, session, policy, storage_id, parent_param).await {
        Ok(infos) => {
            attempts.push(Attempt {
                name: "recovery".into(),
                duration: start.elapsed(),
                succeeded: true,
                error: None,
            });
            Ok(infos)
        }
        Err(e) => {
            attempts.push(Attempt {
                name: "recovery".into(),
                duration: start.elapsed(),
                succeeded: false,
                error: Some(e.to_string()),
            });
            Err(FallbackAllFailed { attempts })
        }
    }
}

async fn get_prop_list(
    link: &mut dyn UsbLink,
    session: &mut Session,
    policy: &DevicePolicy,
    storage_id: u32,
    parent_param: u32,
) -> Result<Vec<ObjectInfo>, EngineError> {
    let outcome = execute_command(
        link,
        session,
        policy,
        opcodes::GET_OBJECT_PROP_LIST,
        &[storage_id, 0, 0, parent_param],
        DataPhase::In { max_len: 16 * 1024 * 1024 },
    )
    .await?;
    Ok(decode_prop_list(&outcome.data_in.unwrap_or_default()))
}

async fn recover_and_retry(
    link: &mut dyn UsbLink,
    session: &mut Session,
    policy: &DevicePolicy,
    storage_id: u32,
    parent_param: u32,
) -> Result<Vec<ObjectInfo>, EngineError> {
    execute_command(link, session, policy, opcodes::CLOSE_SESSION, &[], DataPhase::None).await?;
    execute_command(
        link,
        session,
        policy,
        opcodes::OPEN_SESSION,
        &[session.session_id.max(1)],
        DataPhase::None,
    )
    .await?;
    get_handles_then_infos(link, session, policy, storage_id, parent_param).await
}

async fn get_handles_then_infos(
    link: &mut dyn UsbLink,
    session: &mut Session,
    policy: &DevicePolicy,
    storage_id: u32,
    parent_param: u32,
) -> Result<Vec<ObjectInfo>, EngineError> {
    let handles_outcome = execute_command(
        link,
        session,
        policy,
        opcodes::GET_OBJECT_HANDLES,
        &[storage_id, 0, parent_param],
        DataPhase::In { max_len: 1024 * 1024 },
    )
    .await?;
    let handles = decode_u32_array(&handles_outcome.data_in.unwrap_or_default());

    let mut infos = Vec::with_capacity(handles.len());
    for handle in handles {
        let info_outcome = execute_command(
            link,
            session,
            policy,
            opcodes::GET_OBJECT_INFO,
            &[handle],
            DataPhase::In { max_len: 64 * 1024 },
        )
        .await?;
        infos.push(decode_object_info(handle, &info_outcome.data_in.unwrap_or_default()));
    }
    Ok(infos)
}

fn decode_u32_array(bytes: &[u8]) -> Vec<u32> {
    let Some(count_bytes) = bytes.get(0..4) else {
        return Vec::new();
    };
    let count = u32::from_le_bytes(count_bytes.try_into().unwrap()) as usize;
    bytes[4..]
        .chunks_exact(4)
        .take(count)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// Minimal `GetObjectInfo` payload decode: this workspace only
/// persists the fields the live index needs (§3 `Object`); the full
/// PTP ObjectInfo dataset carries more than it cares about.
///
/// Layout (fixed header up to `ParentObject`, then three PTP strings):
/// `ObjectFormat` @ 4 (u16), `ObjectCompressedSize` @ 8 (u32),
/// `ParentObject` @ 38 (u32), `Filename` @ 52 (PTP string).
fn decode_object_info(handle: u32, bytes: &[u8]) -> ObjectInfo {
    let format_code = bytes
        .get(4..6)
        .map(|s| u16::from_le_bytes(s.try_into().unwrap()))
        .unwrap_or(0);
    let size = bytes
        .get(8..12)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()) as u64);
    let parent_handle = bytes
        .get(38..42)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .filter(|&p| p != 0 && p != 0xFFFF_FFFF);
    let name = read_ptp_string(bytes, 52).map(|(s, _)| s).unwrap_or_default();
    ObjectInfo {
        handle,
        parent_handle,
        name,
        size,
        format_code,
    }
}

/// Read a PTP string (1-byte UTF-16 unit count, including the trailing
/// NUL, followed by that many little-endian `u16` units) at `offset`.
/// Returns the decoded string and the number of bytes consumed.
fn read_ptp_string(bytes: &[u8], offset: usize) -> Option<(String, usize)> {
    let count = *bytes.get(offset)? as usize;
    if count == 0 {
        return Some((String::new(), 1));
    }
    let start = offset + 1;
    let end = start + count * 2;
    let units: Vec<u16> = bytes
        .get(start..end)?
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let units = match units.last() {
        Some(0) => &units[..units.len() - 1],
        _ => &units[..],
    };
    Some((String::from_utf16_lossy(units), end - offset))
}

fn blank_object_info(handle: u32) -> ObjectInfo {
    ObjectInfo {
        handle,
        parent_handle: None,
        name: String::new(),
        size: None,
        format_code: 0,
    }
}

/// Decode `GetObjectPropList`'s flat `(handle, prop_code, datatype,
/// value)` quadruple stream (count-prefixed, same convention as
/// [`decode_u32_array`]) into one [`ObjectInfo`] per handle, keeping
/// only the properties the live index tracks (§3 `Object`: name, size,
/// parent, format). An unrecognized datatype can't be skipped safely
/// (its width is unknown), so decoding stops at that point and returns
/// whatever was assembled so far.
fn decode_prop_list(bytes: &[u8]) -> Vec<ObjectInfo> {
    use std::collections::BTreeMap;

    let Some(count_bytes) = bytes.get(0..4) else {
        return Vec::new();
    };
    let count = u32::from_le_bytes(count_bytes.try_into().unwrap()) as usize;
    let mut by_handle: BTreeMap<u32, ObjectInfo> = BTreeMap::new();
    let mut offset = 4;

    for _ in 0..count {
        let Some(handle) = bytes.get(offset..offset + 4).map(|s| u32::from_le_bytes(s.try_into().unwrap())) else {
            break;
        };
        offset += 4;
        let Some(prop_code) = bytes.get(offset..offset + 2).map(|s| u16::from_le_bytes(s.try_into().unwrap())) else {
            break;
        };
        offset += 2;
        let Some(datatype) = bytes.get(offset..offset + 2).map(|s| u16::from_le_bytes(s.try_into().unwrap())) else {
            break;
        };
        offset += 2;

        match datatype {
            opcodes::DATATYPE_UINT16 => {
                let Some(value) = bytes.get(offset..offset + 2).map(|s| u16::from_le_bytes(s.try_into().unwrap())) else {
                    break;
                };
                offset += 2;
                if prop_code == opcodes::PROP_OBJECT_FORMAT {
                    by_handle.entry(handle).or_insert_with(|| blank_object_info(handle)).format_code = value;
                }
            }
            opcodes::DATATYPE_UINT32 => {
                let Some(value) = bytes.get(offset..offset + 4).map(|s| u32::from_le_bytes(s.try_into().unwrap())) else {
                    break;
                };
                offset += 4;
                if prop_code == opcodes::PROP_PARENT_OBJECT {
                    let entry = by_handle.entry(handle).or_insert_with(|| blank_object_info(handle));
                    entry.parent_handle = if value == 0 || value == 0xFFFF_FFFF { None } else { Some(value) };
                }
            }
            opcodes::DATATYPE_UINT64 => {
                let Some(value) = bytes.get(offset..offset + 8).map(|s| u64::from_le_bytes(s.try_into().unwrap())) else {
                    break;
                };
                offset += 8;
                if prop_code == opcodes::PROP_OBJECT_SIZE {
                    by_handle.entry(handle).or_insert_with(|| blank_object_info(handle)).size = Some(value);
                }
            }
            opcodes::DATATYPE_STRING => {
                let Some((value, consumed)) = read_ptp_string(bytes, offset) else {
                    break;
                };
                offset += consumed;
                if prop_code == opcodes::PROP_OBJECT_FILE_NAME {
                    by_handle.entry(handle).or_insert_with(|| blank_object_info(handle)).name = value;
                }
            }
            _ => break,
        }
    }

    by_handle.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_u32_array_reads_count_prefixed_handles() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes());
        assert_eq!(decode_u32_array(&bytes), vec![10, 20]);
    }

    #[test]
    fn decode_u32_array_handles_empty_input() {
        assert_eq!(decode_u32_array(&[]), Vec::<u32>::new());
    }

    fn write_ptp_string(buf: &mut Vec<u8>, s: &str) {
        if s.is_empty() {
            buf.push(0);
            return;
        }
        let units: Vec<u16> = s.encode_utf16().chain(std::iter::once(0)).collect();
        buf.push(units.len() as u8);
        for u in units {
            buf.extend_from_slice(&u.to_le_bytes());
        }
    }

    #[test]
    fn decode_object_info_reads_format_size_parent_and_name() {
        let mut bytes = vec![0u8; 52];
        bytes[4..6].copy_from_slice(&0x3801u16.to_le_bytes());
        bytes[8..12].copy_from_slice(&4096u32.to_le_bytes());
        bytes[38..42].copy_from_slice(&7u32.to_le_bytes());
        write_ptp_string(&mut bytes, "photo.jpg");

        let info = decode_object_info(99, &bytes);
        assert_eq!(info.handle, 99);
        assert_eq!(info.format_code, 0x3801);
        assert_eq!(info.size, Some(4096));
        assert_eq!(info.parent_handle, Some(7));
        assert_eq!(info.name, "photo.jpg");
    }

    #[test]
    fn decode_object_info_treats_sentinel_parent_as_root() {
        let mut bytes = vec![0u8; 52];
        bytes[38..42].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        write_ptp_string(&mut bytes, "a.jpg");

        let info = decode_object_info(1, &bytes);
        assert_eq!(info.parent_handle, None);
    }

    fn prop_element(buf: &mut Vec<u8>, handle: u32, prop_code: u16, datatype: u16, encode_value: impl FnOnce(&mut Vec<u8>)) {
        buf.extend_from_slice(&handle.to_le_bytes());
        buf.extend_from_slice(&prop_code.to_le_bytes());
        buf.extend_from_slice(&datatype.to_le_bytes());
        encode_value(buf);
    }

    #[test]
    fn decode_prop_list_groups_quadruples_by_handle() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u32.to_le_bytes()); // element count
        prop_element(&mut bytes, 10, opcodes::PROP_OBJECT_FORMAT, opcodes::DATATYPE_UINT16, |b| {
            b.extend_from_slice(&0x3801u16.to_le_bytes())
        });
        prop_element(&mut bytes, 10, opcodes::PROP_OBJECT_SIZE, opcodes::DATATYPE_UINT64, |b| {
            b.extend_from_slice(&123u64.to_le_bytes())
        });
        prop_element(&mut bytes, 10, opcodes::PROP_PARENT_OBJECT, opcodes::DATATYPE_UINT32, |b| {
            b.extend_from_slice(&5u32.to_le_bytes())
        });
        prop_element(&mut bytes, 10, opcodes::PROP_OBJECT_FILE_NAME, opcodes::DATATYPE_STRING, |b| {
            write_ptp_string(b, "a.jpg")
        });

        let infos = decode_prop_list(&bytes);
        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.handle, 10);
        assert_eq!(info.format_code, 0x3801);
        assert_eq!(info.size, Some(123));
        assert_eq!(info.parent_handle, Some(5));
        assert_eq!(info.name, "a.jpg");
    }

    #[test]
    fn decode_prop_list_handles_empty_input() {
        assert_eq!(decode_prop_list(&[]), Vec::new());
    }
}
