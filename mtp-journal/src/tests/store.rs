use std::time::Duration;

use super::*;

fn journal() -> Journal {
    Journal::open_in_memory().unwrap()
}

#[test]
fn begin_read_starts_in_started_state() {
    let j = journal();
    let id = j
        .begin_read("dev-1", 7, "IMG_0001.JPG", Some(1024), true, "/tmp/a.part", None, Some("etag-1"))
        .unwrap();
    let rec = j.get(id).unwrap();
    assert_eq!(rec.state, TransferState::Started);
    assert_eq!(rec.kind, TransferKind::Read);
    assert_eq!(rec.committed_bytes, 0);
    assert_eq!(rec.handle, Some(7));
}

#[test]
fn update_progress_advances_to_in_progress_and_enforces_total() {
    let j = journal();
    let id = j
        .begin_write("dev-1", Some(1), "clip.mp4", 1000, true, "/tmp/b.part", None)
        .unwrap();
    j.update_progress(id, 500).unwrap();
    assert_eq!(j.get(id).unwrap().state, TransferState::InProgress);

    let err = j.update_progress(id, 1001).unwrap_err();
    assert!(matches!(err, JournalError::ProgressExceedsTotal { .. }));
}

#[test]
fn complete_removes_from_resumable_set() {
    let j = journal();
    let id = j
        .begin_write("dev-1", Some(1), "clip.mp4", 1000, true, "/tmp/c.part", None)
        .unwrap();
    j.update_progress(id, 1000).unwrap();
    j.complete(id).unwrap();
    assert!(j.load_resumables("dev-1").unwrap().is_empty());
    assert_eq!(j.get(id).unwrap().state, TransferState::Done);
}

#[test]
fn fail_records_error_and_rejects_further_progress() {
    let j = journal();
    let id = j
        .begin_read("dev-1", 3, "a.jpg", Some(10), false, "/tmp/d.part", None, None)
        .unwrap();
    j.fail(id, "device disconnected").unwrap();
    let rec = j.get(id).unwrap();
    assert_eq!(rec.state, TransferState::Failed);
    assert_eq!(rec.last_error.as_deref(), Some("device disconnected"));
    assert!(!rec.state.is_resumable());
}

#[test]
fn pause_and_resume_round_trip() {
    let j = journal();
    let id = j
        .begin_write("dev-1", None, "f.bin", 10, true, "/tmp/e.part", None)
        .unwrap();
    j.update_progress(id, 5).unwrap();
    j.pause(id).unwrap();
    assert_eq!(j.get(id).unwrap().state, TransferState::Paused);
    j.resume(id).unwrap();
    assert_eq!(j.get(id).unwrap().state, TransferState::InProgress);
}

#[test]
fn illegal_transition_is_rejected() {
    let j = journal();
    let id = j
        .begin_write("dev-1", None, "f.bin", 10, true, "/tmp/f.part", None)
        .unwrap();
    // started -> done is not in the DAG; must pass through in_progress.
    let err = j.complete(id).unwrap_err();
    assert!(matches!(err, JournalError::IllegalTransition { .. }));
}

#[test]
fn load_resumables_only_returns_non_terminal_records_for_the_device() {
    let j = journal();
    let a = j
        .begin_write("dev-1", None, "one.bin", 10, true, "/tmp/g.part", None)
        .unwrap();
    let b = j
        .begin_write("dev-1", None, "two.bin", 10, true, "/tmp/h.part", None)
        .unwrap();
    j.update_progress(b, 10).unwrap();
    j.complete(b).unwrap();
    j.begin_write("dev-2", None, "other-device.bin", 10, true, "/tmp/i.part", None)
        .unwrap();

    let resumable = j.load_resumables("dev-1").unwrap();
    assert_eq!(resumable.len(), 1);
    assert_eq!(resumable[0].id, a);
}

#[test]
fn reconcile_write_marks_done_when_sizes_match() {
    let j = journal();
    let id = j
        .begin_write("dev-1", None, "f.bin", 100, true, "/tmp/j.part", None)
        .unwrap();
    j.update_progress(id, 80).unwrap();
    j.record_remote_handle(id, 42).unwrap();

    let outcome = j.reconcile_write(id, 100, 100).unwrap();
    assert_eq!(outcome, ReconcileOutcome::AlreadyComplete);
    assert_eq!(j.get(id).unwrap().state, TransferState::Done);
}

#[test]
fn reconcile_write_resets_progress_when_remote_is_short() {
    let j = journal();
    let id = j
        .begin_write("dev-1", None, "f.bin", 100, true, "/tmp/k.part", None)
        .unwrap();
    j.update_progress(id, 80).unwrap();
    j.record_remote_handle(id, 42).unwrap();

    let outcome = j.reconcile_write(id, 60, 100).unwrap();
    assert_eq!(outcome, ReconcileOutcome::Restarted);
    let rec = j.get(id).unwrap();
    assert_eq!(rec.committed_bytes, 0);
    assert_eq!(rec.remote_handle, None);
    assert_eq!(rec.state, TransferState::InProgress);
}

#[test]
fn reconcile_read_restarts_on_etag_mismatch() {
    let j = journal();
    let id = j
        .begin_read("dev-1", 9, "a.jpg", Some(100), true, "/tmp/l.part", None, Some("etag-1"))
        .unwrap();
    j.update_progress(id, 40).unwrap();

    let outcome = j.reconcile_read(id, false).unwrap();
    assert_eq!(outcome, ReconcileOutcome::Restarted);
    let rec = j.get(id).unwrap();
    assert_eq!(rec.committed_bytes, 0);
    assert_eq!(rec.state, TransferState::Started);
}

#[test]
fn reconcile_read_is_a_noop_when_etag_matches() {
    let j = journal();
    let id = j
        .begin_read("dev-1", 9, "a.jpg", Some(100), true, "/tmp/m.part", None, Some("etag-1"))
        .unwrap();
    j.update_progress(id, 40).unwrap();

    let outcome = j.reconcile_read(id, true).unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(j.get(id).unwrap().committed_bytes, 40);
}

#[test]
fn clear_stale_temps_removes_aged_non_done_records_and_returns_their_paths() {
    let j = journal();
    let stale = j
        .begin_write("dev-1", None, "orphan.bin", 10, true, "/tmp/stale.part", None)
        .unwrap();
    let fresh = j
        .begin_write("dev-1", None, "keep.bin", 10, true, "/tmp/fresh.part", None)
        .unwrap();

    std::thread::sleep(Duration::from_millis(1100));
    j.update_progress(fresh, 1).unwrap();

    let removed = j.clear_stale_temps(Duration::from_secs(0)).unwrap();
    assert!(removed.contains(&"/tmp/stale.part".to_string()));
    assert!(j.get(stale).is_err());
    // `fresh` was touched after the cutoff moment, so it survives.
    assert!(j.get(fresh).is_ok());
}
