//! Pre-attach device enumeration, in the declarative style
//! `cotton-netif` uses to list network interfaces: walk what the OS
//! reports, build one immutable summary per candidate, and let the
//! caller (the quirk resolver, then the engine) decide what to do with
//! each one. This crate does not filter by known vendor/product IDs --
//! that's the quirk resolver's job.

use mtp_errors::TransportError;

use crate::types::DeviceSummary;

/// PTP's standard still-image-capture interface class/subclass/protocol.
const PTP_INTERFACE_CLASS: u8 = 0x06;
const PTP_INTERFACE_SUBCLASS: u8 = 0x01;
const PTP_INTERFACE_PROTOCOL: u8 = 0x01;

/// Enumerate every attached USB device exposing a still-image-capture
/// (PTP) interface, or an interface a quirk entry might later
/// recognize as MTP-over-vendor-class. Devices that can't be opened
/// for descriptor reads (permissions, in-use) are skipped rather than
/// failing the whole scan.
#[cfg(feature = "rusb-backend")]
pub fn enumerate_candidates() -> Result<Vec<DeviceSummary>, TransportError> {
    let devices = rusb::devices().map_err(map_rusb_err)?;
    let mut out = Vec::new();

    for device in devices.iter() {
        let Ok(config) = device.active_config_descriptor() else {
            continue;
        };
        let device_desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        for iface in config.interfaces() {
            let Some(desc) = iface.descriptors().next() else {
                continue;
            };
            let looks_like_ptp = desc.class_code() == PTP_INTERFACE_CLASS
                && desc.sub_class_code() == PTP_INTERFACE_SUBCLASS
                && desc.protocol_code() == PTP_INTERFACE_PROTOCOL;
            // Vendor-specific MTP interfaces (e.g. class 0xff) are
            // also collected; the quirk resolver decides if they are
            // a recognized MTP variant.
            let looks_like_vendor_mtp = desc.class_code() == 0xff;
            if !looks_like_ptp && !looks_like_vendor_mtp {
                continue;
            }

            let (manufacturer, model) = read_strings(&device, &device_desc);

            out.push(DeviceSummary {
                id: format!("{}:{}", device.bus_number(), device.address()),
                vendor_id: device_desc.vendor_id(),
                product_id: device_desc.product_id(),
                bus: Some(device.bus_number()),
                address: Some(device.address()),
                manufacturer,
                model,
                interface_class: desc.class_code(),
                interface_subclass: desc.sub_class_code(),
                interface_protocol: desc.protocol_code(),
                bcd_device: bcd_from_version(device_desc.device_version()),
            });
            break;
        }
    }

    Ok(out)
}

#[cfg(feature = "rusb-backend")]
fn read_strings(
    device: &rusb::Device<rusb::GlobalContext>,
    desc: &rusb::DeviceDescriptor,
) -> (Option<String>, Option<String>) {
    let Ok(handle) = device.open() else {
        return (None, None);
    };
    let timeout = std::time::Duration::from_millis(200);
    let languages = handle.read_languages(timeout).unwrap_or_default();
    let Some(lang) = languages.first().copied() else {
        return (None, None);
    };
    let manufacturer = desc
        .manufacturer_string_index()
        .and_then(|_| handle.read_manufacturer_string(lang, desc, timeout).ok());
    let model = desc
        .product_string_index()
        .and_then(|_| handle.read_product_string(lang, desc, timeout).ok());
    (manufacturer, model)
}

#[cfg(feature = "rusb-backend")]
fn bcd_from_version(v: rusb::Version) -> u16 {
    (v.major() as u16) << 8 | (v.minor() as u16) << 4 | v.sub_minor() as u16
}

#[cfg(feature = "rusb-backend")]
fn map_rusb_err(e: rusb::Error) -> TransportError {
    match e {
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::Access => TransportError::AccessDenied,
        other => TransportError::Io(other.to_string()),
    }
}

#[cfg(not(feature = "rusb-backend"))]
/// Without the `rusb-backend` feature there is no OS bus to scan.
pub fn enumerate_candidates() -> Result<Vec<DeviceSummary>, TransportError> {
    Ok(Vec::new())
}
