//! Minimal encode/decode for the classic PTP `ObjectInfo` dataset, as
//! sent ahead of `SendObject` (§6 "PTP wire format", opcode `0x100C`).

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

/// Build the `ObjectInfo` dataset for `SendObjectInfo`. Only the
/// fields this workspace's consumers rely on are populated; the
/// optional thumbnail/association/date fields are zeroed, which every
/// MTP responder accepts.
pub fn encode_object_info(parent: Option<u32>, storage_id: u32, name: &str, size: u64, format_code: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(52 + name.len() * 2);
    buf.extend_from_slice(&storage_id.to_le_bytes());
    buf.extend_from_slice(&format_code.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // ProtectionStatus
    buf.extend_from_slice(&(size.min(u32::MAX as u64) as u32).to_le_bytes()); // ObjectCompressedSize
    buf.extend_from_slice(&0u16.to_le_bytes()); // ThumbFormat
    buf.extend_from_slice(&0u32.to_le_bytes()); // ThumbCompressedSize
    buf.extend_from_slice(&0u32.to_le_bytes()); // ThumbPixWidth
    buf.extend_from_slice(&0u32.to_le_bytes()); // ThumbPixHeight
    buf.extend_from_slice(&0u32.to_le_bytes()); // ImagePixWidth
    buf.extend_from_slice(&0u32.to_le_bytes()); // ImagePixHeight
    buf.extend_from_slice(&0u32.to_le_bytes()); // ImageBitDepth
    buf.extend_from_slice(&parent.unwrap_or(0xFFFF_FFFF).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // AssociationType
    buf.extend_from_slice(&0u32.to_le_bytes()); // AssociationDesc
    buf.extend_from_slice(&0u32.to_le_bytes()); // SequenceNumber
    write_ptp_string(&mut buf, name);
    write_ptp_string(&mut buf, ""); // CaptureDate
    write_ptp_string(&mut buf, ""); // ModificationDate
    write_ptp_string(&mut buf, ""); // Keywords
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_name_and_size() {
        let bytes = encode_object_info(Some(7), 1, "a.jpg", 4096, 0x3801);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(bytes[4..6].try_into().unwrap()), 0x3801);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 4096);
    }

    #[test]
    fn empty_name_encodes_zero_length_string() {
        let bytes = encode_object_info(None, 1, "", 0, 0x3000);
        assert!(!bytes.is_empty());
    }
}
