//! Integration tests for the local datastore.

use proptest::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use tickernotes_core::{apply, ApplyOutcome, Config, CoreError, EntityTables, LocalStore};
use tickernotes_protocol::{
    sort_for_apply, DeviceId, EntityRef, GroupMove, Note, Operation, OperationKind, Security,
    Timestamp,
};

fn op(device: &str, seq: u64, ts: &str, kind: OperationKind) -> Operation {
    Operation::new(DeviceId::new(device), seq, Timestamp::from_raw(ts), kind)
}

#[test]
fn state_survives_reopen() {
    let dir = tempdir().unwrap();
    let (sec_id, group_id) = {
        let store = LocalStore::open(dir.path(), Config::default()).unwrap();
        let group = store.add_group("Semis").unwrap();
        let sec = store.add_security("AMD", Some("Advanced Micro")).unwrap();
        store.move_security_to_group(&sec.id, Some(&group.id)).unwrap();
        store.add_note(&sec.id, "Data center growth").unwrap();
        store.update_setting("currency", json!("USD")).unwrap();
        (sec.id, group.id)
    };

    let store = LocalStore::open(dir.path(), Config::default().sync_on_write(false)).unwrap();
    let sec = store.security(&sec_id).unwrap();
    assert_eq!(sec.group_id.as_deref(), Some(group_id.as_str()));
    assert_eq!(store.notes_for(&sec_id).len(), 1);
    assert_eq!(store.setting("currency"), Some(json!("USD")));
    assert_eq!(store.pending_count(), 5);
    assert!(store.device_id().as_str().starts_with("device-"));
}

#[test]
fn open_missing_dir_without_create_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let result = LocalStore::open(&missing, Config::default().create_if_missing(false));
    assert!(result.is_err());
}

#[test]
fn dropped_store_releases_lock() {
    let dir = tempdir().unwrap();
    {
        let _store = LocalStore::open(dir.path(), Config::default()).unwrap();
        assert!(matches!(
            LocalStore::open(dir.path(), Config::default()),
            Err(CoreError::DatabaseLocked)
        ));
    }
    assert!(LocalStore::open(dir.path(), Config::default()).is_ok());
}

#[test]
fn prune_never_reuses_sequence_numbers() {
    let dir = tempdir().unwrap();
    {
        let store = LocalStore::open(dir.path(), Config::default()).unwrap();
        let sec = store.add_security("IBM", None).unwrap();
        store.toggle_security_active(&sec.id, false).unwrap();
        let ids: Vec<_> = store.list_unsynced().iter().map(Operation::id).collect();
        store.mark_synced(&ids).unwrap();
        assert_eq!(store.prune_synced(chrono::Duration::milliseconds(-1)).unwrap(), 2);
        assert!(store.local_operations().is_empty());
    }

    let store = LocalStore::open(dir.path(), Config::default()).unwrap();
    let group = store.add_group("Legacy").unwrap();
    let ops = store.local_operations();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].seq, 2);
    assert_eq!(store.groups()[0].id, group.id);
}

#[test]
fn prune_keeps_recent_and_unsynced() {
    let store = LocalStore::in_memory(DeviceId::new("device-p"));
    let sec = store.add_security("T", None).unwrap();
    let first = store.list_unsynced()[0].id();
    store.mark_synced(&[first]).unwrap();
    store.add_note(&sec.id, "pending").unwrap();

    assert_eq!(store.prune_synced(chrono::Duration::days(30)).unwrap(), 0);
    assert_eq!(store.local_operations().len(), 2);
    assert_eq!(store.pending_count(), 1);
}

#[test]
fn remote_batch_in_apply_order_converges() {
    let ops = vec![
        op(
            "device-b",
            0,
            "2024-03-01T10:00:01.000Z",
            OperationKind::AddSecurity(Security::new("sec-1", "AAPL")),
        ),
        op(
            "device-a",
            0,
            "2024-03-01T10:00:00.000Z",
            OperationKind::AddSecurity(Security::new("sec-1", "AAPL.OLD")),
        ),
        op(
            "device-a",
            1,
            "2024-03-01T10:00:02.000Z",
            OperationKind::AddNote(Note::new("note-1", "sec-1", "hi")),
        ),
    ];

    let forward = LocalStore::in_memory(DeviceId::new("x"));
    let backward = LocalStore::in_memory(DeviceId::new("y"));

    let mut sorted = ops.clone();
    sort_for_apply(&mut sorted);
    forward.apply_remote(&sorted).unwrap();

    let mut reversed: Vec<_> = ops.into_iter().rev().collect();
    sort_for_apply(&mut reversed);
    backward.apply_remote(&reversed).unwrap();

    assert_eq!(forward.tables(), backward.tables());
    assert_eq!(forward.security("sec-1").unwrap().symbol, "AAPL");
}

#[test]
fn group_delete_keeps_members() {
    let mut tables = EntityTables::new();
    let mut sec = Security::new("sec-1", "V");
    sec.group_id = Some("grp-1".into());
    tables.securities.insert(sec.id.clone(), sec);

    let delete = op(
        "d",
        0,
        "2024-01-01T00:00:00.000Z",
        OperationKind::DeleteGroup(EntityRef::new("grp-1")),
    );
    assert_eq!(apply(&mut tables, &delete).unwrap(), ApplyOutcome::Applied);
    assert_eq!(tables.securities["sec-1"].group_id, None);

    let reassign = op(
        "d",
        1,
        "2024-01-01T00:00:01.000Z",
        OperationKind::MoveSecurityToGroup(GroupMove {
            security_id: "sec-gone".into(),
            group_id: None,
        }),
    );
    assert_eq!(apply(&mut tables, &reassign).unwrap(), ApplyOutcome::Skipped);
}

proptest! {
    #[test]
    fn replaying_a_batch_twice_changes_nothing(count in 1usize..8, notes in 0usize..4) {
        let mut batch = Vec::new();
        for i in 0..count {
            batch.push(op(
                "device-r",
                i as u64,
                "2024-01-01T00:00:00.000Z",
                OperationKind::AddSecurity(Security::new(format!("sec-{i}"), "X")),
            ));
        }
        for j in 0..notes {
            batch.push(op(
                "device-r",
                (count + j) as u64,
                "2024-01-01T00:00:01.000Z",
                OperationKind::AddNote(Note::new(format!("note-{j}"), "sec-0", "n")),
            ));
        }

        let store = LocalStore::in_memory(DeviceId::new("device-s"));
        let first = store.apply_remote(&batch).unwrap();
        let tables = store.tables();
        let second = store.apply_remote(&batch).unwrap();

        prop_assert_eq!(first.applied, count + notes);
        prop_assert_eq!(second.duplicates, count + notes);
        prop_assert_eq!(store.tables(), tables);
    }
}
