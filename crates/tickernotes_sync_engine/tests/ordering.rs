//! Devices that pull the same set of operations end in the same state.

use proptest::prelude::*;
use std::sync::Arc;
use tickernotes_core::{EntityTables, LocalStore};
use tickernotes_protocol::{
    append_operations, DeviceId, EntityPatch, EntityRef, GroupMove, Operation, OperationKind,
    Security, Timestamp, ToggleActive,
};
use tickernotes_storage::InMemoryRemoteStore;
use tickernotes_sync_engine::SyncEngine;

fn kind(choice: u8, n: u8) -> OperationKind {
    let id = format!("sec-{}", n % 3);
    match choice % 5 {
        0 => OperationKind::AddSecurity(Security::new(id, format!("SYM{n}"))),
        1 => {
            let mut fields = serde_json::Map::new();
            fields.insert("name".into(), serde_json::json!(format!("name {n}")));
            OperationKind::UpdateSecurity(EntityPatch::new(id, fields))
        }
        2 => OperationKind::ToggleSecurityActive(ToggleActive {
            id,
            is_active: n % 2 == 0,
        }),
        3 => OperationKind::MoveSecurityToGroup(GroupMove {
            security_id: id,
            group_id: Some(format!("grp-{}", n % 2)),
        }),
        _ => OperationKind::DeleteSecurity(EntityRef::new(id)),
    }
}

fn pull_from(ops: &[Operation]) -> EntityTables {
    let refs: Vec<&Operation> = ops.iter().collect();
    let remote = InMemoryRemoteStore::with_log(append_operations(b"", &refs).unwrap());
    let store = Arc::new(LocalStore::in_memory(DeviceId::new("device-reader")));
    let engine = SyncEngine::with_defaults(store, remote);
    engine.pull().unwrap();
    engine.store().tables()
}

proptest! {
    #[test]
    fn log_order_does_not_change_result(
        specs in prop::collection::vec((0u8..3, 0u8..4, any::<u8>(), any::<u8>()), 1..25),
        rotation in any::<usize>(),
    ) {
        let mut next_seq = [0u64; 3];
        let ops: Vec<Operation> = specs
            .iter()
            .map(|&(device, second, choice, n)| {
                let seq = next_seq[device as usize];
                next_seq[device as usize] += 1;
                Operation::new(
                    DeviceId::new(format!("device-{device}")),
                    seq,
                    Timestamp::from_raw(format!("2024-01-01T00:00:0{second}.000Z")),
                    kind(choice, n),
                )
            })
            .collect();

        let mut shuffled = ops.clone();
        let len = shuffled.len();
        shuffled.rotate_left(rotation % len);
        shuffled.reverse();

        let first = pull_from(&ops);
        let second = pull_from(&shuffled);
        prop_assert_eq!(first, second);
    }
}
