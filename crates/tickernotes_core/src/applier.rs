//! Operation applier.
//!
//! [`apply`] folds one operation into the entity tables. It is the only code
//! that mutates entities, for local mutations and pulled operations alike.
//!
//! Semantics per kind:
//!
//! - create: upsert by id (the whole record is replaced)
//! - update: merge only the patch's fields; a missing target is skipped,
//!   never resurrected
//! - delete: remove the target; deleting a security removes its notes,
//!   deleting a group clears `group_id` on its members
//! - bulk kinds: the single-entity rule applied per id
//! - unknown kinds: ignored

use crate::error::ApplyError;
use crate::tables::EntityTables;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tickernotes_protocol::{merge_fields, EntityPatch, Operation, OperationKind};

/// What applying an operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The tables changed (or were already in the target state).
    Applied,
    /// The target no longer exists; nothing changed.
    Skipped,
    /// The operation kind is not understood; nothing changed.
    Ignored,
}

/// Applies one operation to the tables.
///
/// # Errors
///
/// Returns an [`ApplyError`] if the operation cannot be folded in. The tables
/// are left unchanged in that case.
pub fn apply(tables: &mut EntityTables, op: &Operation) -> Result<ApplyOutcome, ApplyError> {
    let name = op.kind.name();
    let outcome = match &op.kind {
        OperationKind::AddSecurity(security) => {
            require_id(name, &security.id)?;
            tables
                .securities
                .insert(security.id.clone(), security.clone());
            ApplyOutcome::Applied
        }
        OperationKind::UpdateSecurity(patch) => {
            merge_into(&mut tables.securities, "security", name, patch, |s, id| {
                s.id = id.to_string();
            })?
        }
        OperationKind::DeleteSecurity(target) => {
            delete_security(tables, &target.id);
            ApplyOutcome::Applied
        }
        OperationKind::ToggleSecurityActive(toggle) => {
            match tables.securities.get_mut(&toggle.id) {
                Some(sec) => {
                    sec.is_active = toggle.is_active;
                    ApplyOutcome::Applied
                }
                None => ApplyOutcome::Skipped,
            }
        }
        OperationKind::UpdatePurchase(purchase) => match tables.securities.get_mut(&purchase.id) {
            Some(sec) => {
                sec.first_purchase_date = purchase.first_purchase_date.clone();
                sec.first_purchase_price = purchase.first_purchase_price;
                sec.first_quantity = purchase.first_quantity;
                ApplyOutcome::Applied
            }
            None => ApplyOutcome::Skipped,
        },
        OperationKind::AddNote(note) => {
            require_id(name, &note.id)?;
            if !tables.securities.contains_key(&note.security_id) {
                return Err(ApplyError::MissingReference {
                    op: name.to_string(),
                    entity: "security",
                    id: note.security_id.clone(),
                });
            }
            tables.notes.insert(note.id.clone(), note.clone());
            ApplyOutcome::Applied
        }
        OperationKind::UpdateNote(patch) => {
            merge_into(&mut tables.notes, "note", name, patch, |n, id| {
                n.id = id.to_string();
            })?
        }
        OperationKind::DeleteNote(target) => {
            tables.notes.remove(&target.id);
            ApplyOutcome::Applied
        }
        OperationKind::TogglePrimaryNote(toggle) => match tables.notes.get_mut(&toggle.id) {
            Some(note) => {
                note.is_primary = toggle.is_primary;
                ApplyOutcome::Applied
            }
            None => ApplyOutcome::Skipped,
        },
        OperationKind::AddGroup(group) => {
            require_id(name, &group.id)?;
            tables.groups.insert(group.id.clone(), group.clone());
            ApplyOutcome::Applied
        }
        OperationKind::UpdateGroup(patch) => {
            merge_into(&mut tables.groups, "group", name, patch, |g, id| {
                g.id = id.to_string();
            })?
        }
        OperationKind::DeleteGroup(target) => {
            tables.groups.remove(&target.id);
            for sec in tables.securities.values_mut() {
                if sec.group_id.as_deref() == Some(target.id.as_str()) {
                    sec.group_id = None;
                }
            }
            ApplyOutcome::Applied
        }
        OperationKind::MoveSecurityToGroup(mv) => match tables.securities.get_mut(&mv.security_id)
        {
            Some(sec) => {
                sec.group_id = mv.group_id.clone();
                ApplyOutcome::Applied
            }
            None => ApplyOutcome::Skipped,
        },
        OperationKind::UpdateSetting(setting) => {
            tables
                .settings
                .insert(setting.key.clone(), setting.value.clone());
            ApplyOutcome::Applied
        }
        OperationKind::BulkMoveSecurities(bulk) => {
            let mut moved = 0usize;
            for id in &bulk.security_ids {
                if let Some(sec) = tables.securities.get_mut(id) {
                    sec.group_id = bulk.group_id.clone();
                    moved += 1;
                }
            }
            if moved < bulk.security_ids.len() {
                tracing::debug!(
                    op = %op.id(),
                    missing = bulk.security_ids.len() - moved,
                    "bulk move skipped missing securities"
                );
            }
            ApplyOutcome::Applied
        }
        OperationKind::BulkDeleteSecurities(bulk) => {
            for id in &bulk.security_ids {
                delete_security(tables, id);
            }
            ApplyOutcome::Applied
        }
        OperationKind::Unknown { op: tag, .. } => {
            tracing::warn!(op = %op.id(), kind = %tag, "ignoring unknown operation type");
            ApplyOutcome::Ignored
        }
    };

    if outcome == ApplyOutcome::Skipped {
        tracing::debug!(
            op = %op.id(),
            kind = name,
            entity = op.kind.entity(),
            "target missing, operation skipped"
        );
    }
    Ok(outcome)
}

fn require_id(op: &str, id: &str) -> Result<(), ApplyError> {
    if id.is_empty() {
        return Err(ApplyError::Rejected {
            op: op.to_string(),
            message: "record id is empty".into(),
        });
    }
    Ok(())
}

fn delete_security(tables: &mut EntityTables, id: &str) {
    tables.securities.remove(id);
    tables.notes.retain(|_, note| note.security_id != id);
}

fn merge_into<T>(
    table: &mut BTreeMap<String, T>,
    entity: &'static str,
    op: &str,
    patch: &EntityPatch,
    set_id: impl FnOnce(&mut T, &str),
) -> Result<ApplyOutcome, ApplyError>
where
    T: Serialize + DeserializeOwned,
{
    let Some(existing) = table.get(&patch.id) else {
        return Ok(ApplyOutcome::Skipped);
    };
    let mut merged = merge_fields(existing, &patch.fields).map_err(|source| ApplyError::Merge {
        op: op.to_string(),
        entity,
        id: patch.id.clone(),
        source,
    })?;
    set_id(&mut merged, &patch.id);
    table.insert(patch.id.clone(), merged);
    Ok(ApplyOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map, Value};
    use tickernotes_protocol::{
        BulkDelete, BulkMove, DeviceId, EntityRef, Group, GroupMove, Note, PurchaseUpdate,
        Security, Setting, Timestamp, ToggleActive,
    };

    fn op(seq: u64, kind: OperationKind) -> Operation {
        Operation::new(
            DeviceId::new("dev"),
            seq,
            Timestamp::from_raw(format!("2024-01-01T00:00:{:02}.000Z", seq % 60)),
            kind,
        )
    }

    fn patch(id: &str, fields: Value) -> EntityPatch {
        let Value::Object(map) = fields else {
            panic!("fields must be an object");
        };
        EntityPatch::new(id, map)
    }

    fn seeded() -> EntityTables {
        let mut tables = EntityTables::new();
        let mut sec = Security::new("sec-1", "AAPL");
        sec.group_id = Some("grp-1".into());
        tables.securities.insert("sec-1".into(), sec);
        tables
            .securities
            .insert("sec-2".into(), Security::new("sec-2", "MSFT"));
        tables.groups.insert("grp-1".into(), Group::new("grp-1", "Tech"));
        tables
            .notes
            .insert("note-1".into(), Note::new("note-1", "sec-1", "first"));
        tables
            .notes
            .insert("note-2".into(), Note::new("note-2", "sec-1", "second"));
        tables
            .notes
            .insert("note-3".into(), Note::new("note-3", "sec-2", "other"));
        tables
    }

    #[test]
    fn create_is_upsert_by_id() {
        let mut tables = EntityTables::new();
        let first = OperationKind::AddSecurity(Security::new("sec-1", "AAPL"));
        let second = OperationKind::AddSecurity(Security::new("sec-1", "AAPL.US"));
        apply(&mut tables, &op(0, first)).unwrap();
        apply(&mut tables, &op(1, second)).unwrap();

        assert_eq!(tables.securities.len(), 1);
        assert_eq!(tables.securities["sec-1"].symbol, "AAPL.US");
    }

    #[test]
    fn update_merges_only_patch_fields() {
        let mut tables = seeded();
        let outcome = apply(
            &mut tables,
            &op(0, OperationKind::UpdateSecurity(patch("sec-1", json!({"name": "Apple Inc."})))),
        )
        .unwrap();

        assert_eq!(outcome, ApplyOutcome::Applied);
        let sec = &tables.securities["sec-1"];
        assert_eq!(sec.name.as_deref(), Some("Apple Inc."));
        assert_eq!(sec.symbol, "AAPL");
        assert_eq!(sec.group_id.as_deref(), Some("grp-1"));
    }

    #[test]
    fn update_of_missing_target_is_skipped() {
        let mut tables = seeded();
        let before = tables.clone();
        let outcome = apply(
            &mut tables,
            &op(0, OperationKind::UpdateNote(patch("note-404", json!({"content": "x"})))),
        )
        .unwrap();

        assert_eq!(outcome, ApplyOutcome::Skipped);
        assert_eq!(tables, before);
    }

    #[test]
    fn bad_merge_leaves_tables_unchanged() {
        let mut tables = seeded();
        let before = tables.clone();
        let err = apply(
            &mut tables,
            &op(
                0,
                OperationKind::UpdateGroup(patch("grp-1", json!({"name": ["not", "a", "string"]}))),
            ),
        )
        .unwrap_err();

        assert!(matches!(err, ApplyError::Merge { .. }));
        assert_eq!(tables, before);
    }

    #[test]
    fn patch_cannot_rename_record() {
        let mut tables = seeded();
        let mut fields = Map::new();
        fields.insert("name".into(), json!("Energy"));
        let mut p = EntityPatch::new("grp-1", fields);
        p.fields.insert("id".into(), json!("grp-evil"));

        apply(&mut tables, &op(0, OperationKind::UpdateGroup(p))).unwrap();
        assert_eq!(tables.groups["grp-1"].id, "grp-1");
        assert_eq!(tables.groups["grp-1"].name, "Energy");
    }

    #[test]
    fn delete_security_cascades_to_notes() {
        let mut tables = seeded();
        apply(&mut tables, &op(0, OperationKind::DeleteSecurity(EntityRef::new("sec-1")))).unwrap();

        assert!(!tables.securities.contains_key("sec-1"));
        assert_eq!(tables.notes.len(), 1);
        assert!(tables.notes.contains_key("note-3"));
    }

    #[test]
    fn delete_group_ungroups_members() {
        let mut tables = seeded();
        apply(&mut tables, &op(0, OperationKind::DeleteGroup(EntityRef::new("grp-1")))).unwrap();

        assert!(tables.groups.is_empty());
        assert_eq!(tables.securities.len(), 2);
        assert!(tables.securities["sec-1"].group_id.is_none());
    }

    #[test]
    fn note_requires_existing_security() {
        let mut tables = EntityTables::new();
        let err = apply(
            &mut tables,
            &op(0, OperationKind::AddNote(Note::new("note-1", "sec-9", "orphan"))),
        )
        .unwrap_err();
        assert!(err.is_missing_reference());
        assert!(tables.notes.is_empty());
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut tables = EntityTables::new();
        let err =
            apply(&mut tables, &op(0, OperationKind::AddGroup(Group::new("", "x")))).unwrap_err();
        assert!(matches!(err, ApplyError::Rejected { .. }));
    }

    #[test]
    fn field_kinds() {
        let mut tables = seeded();
        apply(
            &mut tables,
            &op(
                0,
                OperationKind::ToggleSecurityActive(ToggleActive {
                    id: "sec-2".into(),
                    is_active: false,
                }),
            ),
        )
        .unwrap();
        apply(
            &mut tables,
            &op(
                1,
                OperationKind::UpdatePurchase(PurchaseUpdate {
                    id: "sec-2".into(),
                    first_purchase_date: Some("2023-06-01".into()),
                    first_purchase_price: Some(101.5),
                    first_quantity: Some(3.0),
                }),
            ),
        )
        .unwrap();
        apply(
            &mut tables,
            &op(
                2,
                OperationKind::MoveSecurityToGroup(GroupMove {
                    security_id: "sec-2".into(),
                    group_id: Some("grp-1".into()),
                }),
            ),
        )
        .unwrap();
        apply(
            &mut tables,
            &op(
                3,
                OperationKind::UpdateSetting(Setting {
                    key: "currency".into(),
                    value: json!("EUR"),
                }),
            ),
        )
        .unwrap();

        let sec = &tables.securities["sec-2"];
        assert!(!sec.is_active);
        assert_eq!(sec.first_purchase_price, Some(101.5));
        assert_eq!(sec.group_id.as_deref(), Some("grp-1"));
        assert_eq!(tables.settings["currency"], json!("EUR"));
    }

    #[test]
    fn bulk_kinds_apply_per_id() {
        let mut tables = seeded();
        apply(
            &mut tables,
            &op(0, OperationKind::BulkMoveSecurities(BulkMove {
                security_ids: vec!["sec-1".into(), "sec-2".into(), "sec-404".into()],
                group_id: None,
            })),
        )
        .unwrap();
        assert!(tables.securities.values().all(|s| s.group_id.is_none()));

        apply(
            &mut tables,
            &op(1, OperationKind::BulkDeleteSecurities(BulkDelete {
                security_ids: vec!["sec-1".into(), "sec-2".into()],
            })),
        )
        .unwrap();
        assert!(tables.securities.is_empty());
        assert!(tables.notes.is_empty());
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let mut tables = seeded();
        let before = tables.clone();
        let outcome = apply(
            &mut tables,
            &op(0, OperationKind::Unknown { op: "archive".into(), data: json!({"id": "sec-1"}) }),
        )
        .unwrap();
        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert_eq!(tables, before);
    }

    fn arb_kind() -> impl Strategy<Value = OperationKind> {
        let sec_id = prop::sample::select(vec!["sec-1", "sec-2", "sec-3"]);
        let note_id = prop::sample::select(vec!["note-1", "note-2", "note-9"]);
        let grp_id = prop::sample::select(vec!["grp-1", "grp-2"]);
        prop_oneof![
            (sec_id.clone(), "[A-Z]{1,4}")
                .prop_map(|(id, sym)| OperationKind::AddSecurity(Security::new(id, sym))),
            (sec_id.clone(), "[a-z]{0,6}").prop_map(|(id, name)| {
                let mut fields = Map::new();
                fields.insert("name".into(), json!(name));
                OperationKind::UpdateSecurity(EntityPatch::new(id, fields))
            }),
            sec_id.clone().prop_map(|id| OperationKind::DeleteSecurity(EntityRef::new(id))),
            (note_id.clone(), sec_id.clone(), "[a-z ]{0,10}")
                .prop_map(|(id, sec, text)| OperationKind::AddNote(Note::new(id, sec, text))),
            note_id.prop_map(|id| OperationKind::DeleteNote(EntityRef::new(id))),
            grp_id.clone().prop_map(|id| OperationKind::DeleteGroup(EntityRef::new(id))),
            (sec_id, prop::option::of(grp_id)).prop_map(|(id, group)| {
                OperationKind::MoveSecurityToGroup(GroupMove {
                    security_id: id.into(),
                    group_id: group.map(String::from),
                })
            }),
        ]
    }

    proptest! {
        #[test]
        fn applying_twice_equals_applying_once(kinds in prop::collection::vec(arb_kind(), 1..25)) {
            let mut once = seeded();
            let mut twice = seeded();
            for (seq, kind) in kinds.into_iter().enumerate() {
                let op = op(seq as u64, kind);
                let first = apply(&mut once, &op).is_ok();
                let _ = apply(&mut twice, &op);
                let _ = apply(&mut twice, &op);
                prop_assert_eq!(first, apply(&mut once.clone(), &op).is_ok());
                prop_assert_eq!(&once, &twice);
            }
        }
    }
}
