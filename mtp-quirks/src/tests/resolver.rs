use crate::resolver::{CallerOverrides, DeviceDescriptor, QuirkResolver};
use crate::table::{FlagOverrides, QuirkEntry, QuirkTable, TuningOverrides};

fn android_mtp_descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        vid: 0x18d1,
        pid: 0x4ee1,
        bcd_device: 0x0216,
        interface_class: 0xff,
        interface_subclass: 0x42,
        interface_protocol: 0x01,
    }
}

fn ptp_camera_descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        vid: 0x04a9,
        pid: 0x31c1,
        bcd_device: 0x0100,
        interface_class: 0x06,
        interface_subclass: 0x01,
        interface_protocol: 0x01,
    }
}

#[test]
fn synthesizes_camera_class_policy_with_no_static_entry() {
    let resolver = QuirkResolver::new(QuirkTable::default(), tempfile::tempdir().unwrap());
    let policy = resolver.resolve(ptp_camera_descriptor(), &CallerOverrides::default());
    assert!(policy.camera_class);
    assert!(policy.supports_get_object_prop_list);
    assert!(!policy.requires_kernel_detach);
}

#[test]
fn synthesizes_vendor_mtp_policy_with_no_static_entry() {
    let resolver = QuirkResolver::new(QuirkTable::default(), tempfile::tempdir().unwrap());
    let policy = resolver.resolve(android_mtp_descriptor(), &CallerOverrides::default());
    assert!(policy.requires_kernel_detach);
    assert!(!policy.supports_get_object_prop_list);
    assert!(!policy.prefers_proplist_enumeration);
}

#[test]
fn wildcard_subclass_entry_is_less_specific_than_pinned_entry() {
    let wildcard = QuirkEntry {
        id: "android-generic".into(),
        vid: 0x18d1,
        pid: 0x4ee1,
        bcd_range: None,
        iface_class: 0xff,
        iface_subclass: None,
        iface_protocol: None,
        description: "generic android mtp".into(),
        flags: FlagOverrides {
            reset_on_open: Some(true),
            ..Default::default()
        },
        tuning: TuningOverrides::default(),
        hooks: Default::default(),
    };
    let pinned = QuirkEntry {
        id: "android-pinned".into(),
        vid: 0x18d1,
        pid: 0x4ee1,
        bcd_range: None,
        iface_class: 0xff,
        iface_subclass: Some(0x42),
        iface_protocol: Some(0x01),
        description: "pinned android mtp".into(),
        flags: FlagOverrides {
            reset_on_open: Some(false),
            requires_kernel_detach: Some(true),
            ..Default::default()
        },
        tuning: TuningOverrides::default(),
        hooks: Default::default(),
    };
    let table = QuirkTable {
        entries: vec![wildcard, pinned],
    };
    let resolver = QuirkResolver::new(table, tempfile::tempdir().unwrap());
    let policy = resolver.resolve(android_mtp_descriptor(), &CallerOverrides::default());
    assert!(!policy.reset_on_open, "pinned entry should win over wildcard");
    assert!(policy.requires_kernel_detach);
}

#[test]
fn later_registered_entry_wins_a_specificity_tie() {
    let mut entry_a = QuirkEntry {
        id: "a".into(),
        vid: 0x18d1,
        pid: 0x4ee1,
        bcd_range: None,
        iface_class: 0xff,
        iface_subclass: None,
        iface_protocol: None,
        description: String::new(),
        flags: FlagOverrides {
            reset_on_open: Some(false),
            ..Default::default()
        },
        tuning: TuningOverrides::default(),
        hooks: Default::default(),
    };
    let mut entry_b = entry_a.clone();
    entry_b.id = "b".into();
    entry_b.flags.reset_on_open = Some(true);
    entry_a.description = "first".into();

    let table = QuirkTable {
        entries: vec![entry_a, entry_b],
    };
    let resolver = QuirkResolver::new(table, tempfile::tempdir().unwrap());
    let policy = resolver.resolve(android_mtp_descriptor(), &CallerOverrides::default());
    assert!(policy.reset_on_open, "later entry (b) should win the tie");
}

#[test]
fn caller_overrides_win_over_static_and_learned() {
    let resolver = QuirkResolver::new(QuirkTable::default(), tempfile::tempdir().unwrap());
    let overrides = CallerOverrides {
        flags: FlagOverrides {
            supports_get_object_prop_list: Some(true),
            ..Default::default()
        },
        tuning: TuningOverrides::default(),
    };
    let policy = resolver.resolve(android_mtp_descriptor(), &overrides);
    assert!(policy.supports_get_object_prop_list);
}

#[test]
fn auto_demotion_clears_flag_for_rest_of_process() {
    let resolver = QuirkResolver::new(QuirkTable::default(), tempfile::tempdir().unwrap());
    let descriptor = ptp_camera_descriptor();
    let before = resolver.resolve(descriptor, &CallerOverrides::default());
    assert!(before.supports_get_object_prop_list);

    resolver.demote_object_prop_list(&descriptor.fingerprint());

    let after = resolver.resolve(descriptor, &CallerOverrides::default());
    assert!(!after.supports_get_object_prop_list);
    assert!(resolver.is_demoted(&descriptor.fingerprint()));
}

#[test]
fn quirk_table_parses_from_json() {
    let json = r#"{
        "entries": [{
            "id": "pixel-7",
            "vid": 6353,
            "pid": 20193,
            "iface_class": 255,
            "iface_subclass": null,
            "iface_protocol": null,
            "description": "Google Pixel 7",
            "flags": {"requires_kernel_detach": true},
            "tuning": {"max_chunk_bytes": 1048576},
            "hooks": {}
        }]
    }"#;
    let table = QuirkTable::from_json(json).unwrap();
    assert_eq!(table.entries.len(), 1);
    assert_eq!(table.entries[0].id, "pixel-7");
}
