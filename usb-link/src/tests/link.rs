use std::time::Duration;

use mtp_errors::TransportError;

use crate::fakes::{CapturedCall, CapturingLink, FaultInjectingLink, FaultPlan, ScriptedReply, VirtualLink};
use crate::trait_def::MockUsbLink;
use crate::types::{DeviceSummary, OpenOptions};
use crate::UsbLink;

fn summary() -> DeviceSummary {
    DeviceSummary {
        id: "1:2".into(),
        vendor_id: 0x04a9,
        product_id: 0x31c1,
        bus: Some(1),
        address: Some(2),
        manufacturer: Some("Canon".into()),
        model: Some("EOS".into()),
        interface_class: 6,
        interface_subclass: 1,
        interface_protocol: 1,
        bcd_device: 0x0100,
    }
}

#[test]
fn fingerprint_is_lowercase_vid_pid() {
    assert_eq!(summary().fingerprint(), "04a9:31c1");
}

#[test]
fn fingerprint_is_unknown_when_both_zero() {
    let mut s = summary();
    s.vendor_id = 0;
    s.product_id = 0;
    assert_eq!(s.fingerprint(), "unknown");
}

#[tokio::test]
async fn virtual_link_rejects_io_before_open() {
    let mut link = VirtualLink::new();
    let mut buf = [0u8; 8];
    let err = link.bulk_in(&mut buf, Duration::from_millis(10)).await;
    assert_eq!(err, Err(TransportError::NoDevice));
}

#[tokio::test]
async fn virtual_link_plays_back_queued_bulk_in() {
    let mut link = VirtualLink::new();
    link.open(&summary(), OpenOptions::default()).await.unwrap();
    link.queue_bulk_in(ScriptedReply::Bytes(vec![1, 2, 3, 4]));

    let mut buf = [0u8; 8];
    let n = link.bulk_in(&mut buf, Duration::from_millis(10)).await.unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf[..4], &[1, 2, 3, 4]);
}

#[tokio::test]
async fn virtual_link_times_out_with_nothing_queued() {
    let mut link = VirtualLink::new();
    link.open(&summary(), OpenOptions::default()).await.unwrap();
    let mut buf = [0u8; 8];
    let err = link.bulk_in(&mut buf, Duration::from_millis(10)).await;
    assert_eq!(err, Err(TransportError::Timeout));
}

#[tokio::test]
async fn virtual_link_records_bulk_out_writes() {
    let mut link = VirtualLink::new();
    link.open(&summary(), OpenOptions::default()).await.unwrap();
    link.bulk_out(&[9, 9], Duration::from_millis(10)).await.unwrap();
    link.bulk_out(&[1], Duration::from_millis(10)).await.unwrap();
    assert_eq!(link.bulk_out_log(), &[vec![9, 9], vec![1]]);
}

#[tokio::test]
async fn fault_injecting_link_forces_first_failure_then_passes_through() {
    let mut plan = FaultPlan::default();
    plan.bulk_in_failures.push_back(TransportError::Stall);
    let mut inner = VirtualLink::new();
    inner.queue_bulk_in(ScriptedReply::Bytes(vec![7, 7]));
    let mut link = FaultInjectingLink::new(inner, plan);
    link.open(&summary(), OpenOptions::default()).await.unwrap();

    let mut buf = [0u8; 4];
    let first = link.bulk_in(&mut buf, Duration::from_millis(10)).await;
    assert_eq!(first, Err(TransportError::Stall));

    let second = link.bulk_in(&mut buf, Duration::from_millis(10)).await.unwrap();
    assert_eq!(second, 2);
    assert_eq!(&buf[..2], &[7, 7]);
}

#[tokio::test]
async fn capturing_link_records_call_sequence() {
    let mut link = CapturingLink::new(VirtualLink::new());
    link.open(&summary(), OpenOptions::default()).await.unwrap();
    link.bulk_out(&[1, 2], Duration::from_millis(10)).await.unwrap();
    link.close().await;

    let log = link.log();
    assert_eq!(log[0], CapturedCall::Open);
    assert_eq!(log[1], CapturedCall::BulkOut(vec![1, 2]));
    assert_eq!(log[2], CapturedCall::Close);
}

#[tokio::test]
async fn mock_usb_link_satisfies_the_trait_object() {
    let mut mock = MockUsbLink::new();
    mock.expect_open().returning(|_, _| Ok(()));
    mock.expect_bulk_out().returning(|_, _| Ok(()));

    mock.open(&summary(), OpenOptions::default()).await.unwrap();
    mock.bulk_out(&[1], Duration::from_millis(10)).await.unwrap();
}
