use std::time::Duration;

use mtp_quirks::{CallerOverrides, DeviceDescriptor, QuirkResolver, QuirkTable};
use usb_link::{DeviceSummary, OpenOptions, VirtualLink};

use super::*;

fn summary() -> DeviceSummary {
    DeviceSummary {
        id: "1".into(),
        vendor_id: 0x04a9,
        product_id: 0x31c1,
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

fn handle() -> DeviceHandle {
    let resolver = QuirkResolver::new(QuirkTable::default(), tempfile::tempdir().unwrap());
    let descriptor = DeviceDescriptor {
        vid: 0x04a9,
        pid: 0x31c1,
        bcd_device: 0,
        interface_class: 6,
        interface_subclass: 1,
        interface_protocol: 1,
    };
    let policy = resolver.resolve(descriptor, &CallerOverrides::default());
    mtp_engine::spawn(
        Box::new(VirtualLink::new()),
        summary(),
        OpenOptions::default(),
        policy,
        std::sync::Arc::new(resolver),
        descriptor.fingerprint(),
    )
}

#[tokio::test]
async fn attach_mints_identity_and_registers_handle() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(dir.path());
    let identity = registry.attach("sess-1", "04a9:31c1", handle());

    assert!(registry.handle("sess-1").is_some());
    assert!(registry.is_online("sess-1"));
    assert_eq!(registry.device_id_for_domain(identity.domain_id).as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn reattach_with_same_fingerprint_reuses_domain_id() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(dir.path());
    let first = registry.attach("sess-1", "04a9:31c1", handle());
    registry.detach("sess-1");
    let second = registry.attach("sess-2", "04a9:31c1", handle());

    assert_eq!(first.domain_id, second.domain_id);
    assert_eq!(registry.device_id_for_domain(first.domain_id).as_deref(), Some("sess-2"));
}

#[tokio::test]
async fn detach_keeps_entry_but_marks_offline() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(dir.path());
    registry.attach("sess-1", "04a9:31c1", handle());
    registry.detach("sess-1");

    assert!(!registry.is_online("sess-1"));
    assert!(registry.handle("sess-1").is_none());
    assert_eq!(registry.fingerprint("sess-1").as_deref(), Some("04a9:31c1"));
}

#[tokio::test]
async fn sweep_expired_removes_only_entries_past_the_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_threshold(dir.path(), Duration::from_millis(50));
    registry.attach("sess-1", "04a9:31c1", handle());
    registry.detach("sess-1");

    assert!(registry.sweep_expired().is_empty());
    tokio::time::sleep(Duration::from_millis(80)).await;
    let expired = registry.sweep_expired();
    assert_eq!(expired, vec!["sess-1".to_string()]);
    assert!(registry.fingerprint("sess-1").is_none());
}

#[tokio::test]
async fn identities_persist_across_registry_instances() {
    let dir = tempfile::tempdir().unwrap();
    let first_domain = {
        let registry = Registry::new(dir.path());
        registry.attach("sess-1", "04a9:31c1", handle()).domain_id
    };
    let registry = Registry::new(dir.path());
    let identity = registry.attach("sess-2", "04a9:31c1", handle());
    assert_eq!(identity.domain_id, first_domain);
}
