use std::sync::Arc;

use async_trait::async_trait;
use mtp_engine::DeviceHandle;
use mtp_index::{ObjectUpsert, StorageRow};
use mtp_quirks::{CallerOverrides, DeviceDescriptor, QuirkResolver, QuirkTable};
use usb_link::{DeviceSummary, OpenOptions, ScriptedReply, VirtualLink};

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

fn encode_response(code: u16, txid: u32, params: &[u32]) -> Vec<u8> {
    let len = (ptp_wire::HEADER_LEN + params.len() * 4) as u32;
    let mut buf = Vec::with_capacity(len as usize);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&3u16.to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&txid.to_le_bytes());
    for p in params {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    buf
}

fn encode_data(code: u16, txid: u32, payload: &[u8]) -> Vec<u8> {
    let len = (ptp_wire::HEADER_LEN + payload.len()) as u32;
    let mut buf = Vec::with_capacity(len as usize);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&txid.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn spawn_with_replies(replies: Vec<Vec<u8>>) -> DeviceHandle {
    let mut link = VirtualLink::new();
    for bytes in replies {
        link.queue_bulk_in(ScriptedReply::Bytes(bytes));
    }
    let resolver = Arc::new(QuirkResolver::new(QuirkTable::default(), tempfile::tempdir().unwrap()));
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
        Box::new(link),
        summary(),
        OpenOptions::default(),
        policy,
        resolver,
        descriptor.fingerprint(),
    )
}

struct FixedSource {
    bytes: Vec<u8>,
    sent: bool,
}

#[async_trait]
impl ChunkSource for FixedSource {
    async fn next_chunk(&mut self, _max_len: usize) -> std::io::Result<Option<Vec<u8>>> {
        if self.sent {
            return Ok(None);
        }
        self.sent = true;
        Ok(Some(self.bytes.clone()))
    }
}

#[tokio::test]
async fn device_status_reflects_registry_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();
    let handle = spawn_with_replies(vec![]);
    host.registry().attach("dev1", "04a9:31c1", handle);

    assert!(host.device_status("dev1").connected);
    host.registry().detach("dev1");
    assert!(!host.device_status("dev1").connected);
}

#[tokio::test]
async fn list_storages_and_children_read_from_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();
    host.index().upsert_device("dev1", "04a9:31c1", None, None).unwrap();
    host.index()
        .upsert_storage(&StorageRow {
            device_id: "dev1".into(),
            storage_id: 1,
            description: "Internal".into(),
            capacity: Some(1_000_000),
            free: Some(500_000),
            read_only: false,
        })
        .unwrap();
    host.index()
        .upsert_object(
            "dev1",
            &ObjectUpsert {
                storage_id: 1,
                handle: 7,
                parent_handle: None,
                name: "a.jpg".into(),
                path_key: "/a.jpg".into(),
                size: Some(4096),
                mtime: Some(0),
                format_code: 0x3801,
                is_directory: false,
            },
            0,
        )
        .unwrap();

    let storages = host.list_storages("dev1").unwrap();
    assert_eq!(storages.len(), 1);
    let children = host.list_children("dev1", 1, None).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].handle, 7);
}

#[tokio::test]
async fn changes_since_anchor_round_trips_through_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();
    let before = host.current_sync_anchor("dev1").unwrap();
    host.index()
        .upsert_object(
            "dev1",
            &ObjectUpsert {
                storage_id: 1,
                handle: 1,
                parent_handle: None,
                name: "a.jpg".into(),
                path_key: "/a.jpg".into(),
                size: Some(10),
                mtime: Some(0),
                format_code: 0x3801,
                is_directory: false,
            },
            0,
        )
        .unwrap();

    assert!(host.changes_since("dev1", before).unwrap().len() == 1);
    let now = host.current_sync_anchor("dev1").unwrap();
    assert!(host.changes_since("dev1", now).unwrap().is_empty());
}

#[tokio::test]
async fn read_object_pumps_partial_object_and_completes_the_journal() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();
    host.index()
        .upsert_object(
            "dev1",
            &ObjectUpsert {
                storage_id: 1,
                handle: 42,
                parent_handle: None,
                name: "pic.jpg".into(),
                path_key: "/pic.jpg".into(),
                size: Some(4),
                mtime: Some(0),
                format_code: 0x3801,
                is_directory: false,
            },
            0,
        )
        .unwrap();

    let handle = spawn_with_replies(vec![
        encode_response(ptp_wire::opcodes::RESP_OK, 1, &[]),
        encode_data(ptp_wire::opcodes::GET_PARTIAL_OBJECT, 2, &[1, 2, 3, 4]),
        encode_response(ptp_wire::opcodes::RESP_OK, 2, &[4]),
    ]);
    host.registry().attach("dev1", "04a9:31c1", handle.clone());
    handle.open_session().await.unwrap();

    let (mut reader, total) = host.read_object("dev1", 42).await.unwrap();
    assert_eq!(total, 4);
    let chunk = reader.next_chunk().await.unwrap().unwrap();
    assert_eq!(chunk, vec![1, 2, 3, 4]);
    assert!(reader.next_chunk().await.unwrap().is_none());
}

#[tokio::test]
async fn write_object_announces_then_sends_and_upserts_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();

    let handle = spawn_with_replies(vec![
        encode_response(ptp_wire::opcodes::RESP_OK, 1, &[]),
        encode_response(ptp_wire::opcodes::RESP_OK, 2, &[99]),
        encode_response(ptp_wire::opcodes::RESP_OK, 3, &[]),
    ]);
    host.registry().attach("dev1", "04a9:31c1", handle.clone());
    handle.open_session().await.unwrap();

    let mut source = FixedSource { bytes: vec![9, 9, 9], sent: false };
    let new_handle = host.write_object("dev1", 1, None, "note.txt", 3, &mut source).await.unwrap();
    assert_eq!(new_handle, 99);

    let children = host.list_children("dev1", 1, None).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].handle, 99);
    assert_eq!(children[0].name, "note.txt");
}

#[tokio::test]
async fn delete_object_removes_from_index_after_device_accepts() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();
    host.index()
        .upsert_object(
            "dev1",
            &ObjectUpsert {
                storage_id: 1,
                handle: 5,
                parent_handle: None,
                name: "old.jpg".into(),
                path_key: "/old.jpg".into(),
                size: Some(1),
                mtime: Some(0),
                format_code: 0x3801,
                is_directory: false,
            },
            0,
        )
        .unwrap();

    let handle = spawn_with_replies(vec![
        encode_response(ptp_wire::opcodes::RESP_OK, 1, &[]),
        encode_response(ptp_wire::opcodes::RESP_OK, 2, &[]),
    ]);
    host.registry().attach("dev1", "04a9:31c1", handle.clone());
    handle.open_session().await.unwrap();

    host.delete_object("dev1", 5, false).await.unwrap();
    assert!(host.list_children("dev1", 1, None).unwrap().is_empty());
}

#[tokio::test]
async fn create_folder_upserts_a_directory_row() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();

    let handle = spawn_with_replies(vec![
        encode_response(ptp_wire::opcodes::RESP_OK, 1, &[]),
        encode_response(ptp_wire::opcodes::RESP_OK, 2, &[123]),
    ]);
    host.registry().attach("dev1", "04a9:31c1", handle.clone());
    handle.open_session().await.unwrap();

    let new_handle = host.create_folder("dev1", 1, None, "Photos").await.unwrap();
    assert_eq!(new_handle, 123);
    let children = host.list_children("dev1", 1, None).unwrap();
    assert_eq!(children.len(), 1);
    assert!(children[0].is_directory);
}

#[tokio::test]
async fn request_crawl_records_the_crawl_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::open_in_memory(dir.path()).unwrap();
    host.request_crawl("dev1", 1, None).unwrap();
    assert!(host.index().last_crawled_at("dev1", 1, None).unwrap().is_some());
}
