//! Typed mutation helpers and queries on [`LocalStore`].
//!
//! Helpers generate client-side ids (`sec-…`, `note-…`, `grp-…`), stamp
//! `created_at`/`updated_at`, check that targets exist, and then go through
//! [`LocalStore::execute`].

use crate::error::{CoreError, CoreResult};
use crate::store::LocalStore;
use chrono::Utc;
use serde_json::{Map, Value};
use tickernotes_protocol::{
    BulkDelete, BulkMove, EntityPatch, EntityRef, Group, GroupMove, Note, Operation,
    OperationKind, PurchaseUpdate, Security, Setting, Timestamp, ToggleActive,
};
use uuid::Uuid;

/// Generates a client-side id: `{prefix}-{unix millis}-{random}`.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}-{}", Utc::now().timestamp_millis(), &random[..9])
}

/// Builds an update patch stamped with `updated_at`.
fn stamped_patch(id: &str, mut fields: Map<String, Value>) -> EntityPatch {
    fields.insert(
        "updated_at".into(),
        Value::String(Timestamp::now().as_str().to_string()),
    );
    EntityPatch::new(id, fields)
}

impl LocalStore {
    fn require_security(&self, id: &str) -> CoreResult<()> {
        if self.read(|s| s.tables.securities.contains_key(id)) {
            Ok(())
        } else {
            Err(CoreError::not_found("security", id))
        }
    }

    fn require_note(&self, id: &str) -> CoreResult<()> {
        if self.read(|s| s.tables.notes.contains_key(id)) {
            Ok(())
        } else {
            Err(CoreError::not_found("note", id))
        }
    }

    fn require_group(&self, id: &str) -> CoreResult<()> {
        if self.read(|s| s.tables.groups.contains_key(id)) {
            Ok(())
        } else {
            Err(CoreError::not_found("group", id))
        }
    }

    // ----- Securities -----

    /// Adds a security with a generated id.
    pub fn add_security(&self, symbol: &str, name: Option<&str>) -> CoreResult<Security> {
        let mut security = Security::new(generate_id("sec"), symbol);
        security.name = name.map(str::to_string);
        self.insert_security(security)
    }

    /// Adds a fully specified security. An empty id is replaced by a
    /// generated one and a missing `created_at` is stamped.
    pub fn insert_security(&self, mut security: Security) -> CoreResult<Security> {
        if security.id.is_empty() {
            security.id = generate_id("sec");
        }
        if let Some(group_id) = &security.group_id {
            self.require_group(group_id)?;
        }
        security.created_at.get_or_insert_with(Timestamp::now);
        self.execute(OperationKind::AddSecurity(security.clone()))?;
        Ok(security)
    }

    /// Merges `fields` into a security.
    pub fn update_security(&self, id: &str, fields: Map<String, Value>) -> CoreResult<Operation> {
        self.require_security(id)?;
        self.execute(OperationKind::UpdateSecurity(stamped_patch(id, fields)))
    }

    /// Deletes a security and its notes.
    pub fn delete_security(&self, id: &str) -> CoreResult<Operation> {
        self.require_security(id)?;
        self.execute(OperationKind::DeleteSecurity(EntityRef::new(id)))
    }

    /// Sets a security's active flag.
    pub fn toggle_security_active(&self, id: &str, is_active: bool) -> CoreResult<Operation> {
        self.require_security(id)?;
        self.execute(OperationKind::ToggleSecurityActive(ToggleActive {
            id: id.to_string(),
            is_active,
        }))
    }

    /// Overwrites first-purchase details.
    pub fn update_purchase(
        &self,
        id: &str,
        first_purchase_date: Option<String>,
        first_purchase_price: Option<f64>,
        first_quantity: Option<f64>,
    ) -> CoreResult<Operation> {
        self.require_security(id)?;
        self.execute(OperationKind::UpdatePurchase(PurchaseUpdate {
            id: id.to_string(),
            first_purchase_date,
            first_purchase_price,
            first_quantity,
        }))
    }

    /// Moves a security into a group, or out of any group with `None`.
    pub fn move_security_to_group(
        &self,
        security_id: &str,
        group_id: Option<&str>,
    ) -> CoreResult<Operation> {
        self.require_security(security_id)?;
        if let Some(group_id) = group_id {
            self.require_group(group_id)?;
        }
        self.execute(OperationKind::MoveSecurityToGroup(GroupMove {
            security_id: security_id.to_string(),
            group_id: group_id.map(str::to_string),
        }))
    }

    /// Moves many securities at once.
    pub fn bulk_move_securities(
        &self,
        security_ids: &[String],
        group_id: Option<&str>,
    ) -> CoreResult<Operation> {
        if let Some(group_id) = group_id {
            self.require_group(group_id)?;
        }
        self.execute(OperationKind::BulkMoveSecurities(BulkMove {
            security_ids: security_ids.to_vec(),
            group_id: group_id.map(str::to_string),
        }))
    }

    /// Deletes many securities and their notes.
    pub fn bulk_delete_securities(&self, security_ids: &[String]) -> CoreResult<Operation> {
        self.execute(OperationKind::BulkDeleteSecurities(BulkDelete {
            security_ids: security_ids.to_vec(),
        }))
    }

    // ----- Notes -----

    /// Adds a note to a security.
    pub fn add_note(&self, security_id: &str, content: &str) -> CoreResult<Note> {
        self.require_security(security_id)?;
        let mut note = Note::new(generate_id("note"), security_id, content);
        note.created_at = Some(Timestamp::now());
        self.execute(OperationKind::AddNote(note.clone()))?;
        Ok(note)
    }

    /// Replaces a note's content.
    pub fn update_note(&self, id: &str, content: &str) -> CoreResult<Operation> {
        self.require_note(id)?;
        let mut fields = Map::new();
        fields.insert("content".into(), Value::String(content.to_string()));
        self.execute(OperationKind::UpdateNote(stamped_patch(id, fields)))
    }

    /// Deletes a note.
    pub fn delete_note(&self, id: &str) -> CoreResult<Operation> {
        self.require_note(id)?;
        self.execute(OperationKind::DeleteNote(EntityRef::new(id)))
    }

    // ----- Groups -----

    /// Adds a group.
    pub fn add_group(&self, name: &str) -> CoreResult<Group> {
        let mut group = Group::new(generate_id("grp"), name);
        group.created_at = Some(Timestamp::now());
        self.execute(OperationKind::AddGroup(group.clone()))?;
        Ok(group)
    }

    /// Renames a group.
    pub fn update_group(&self, id: &str, name: &str) -> CoreResult<Operation> {
        self.require_group(id)?;
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name.to_string()));
        self.execute(OperationKind::UpdateGroup(stamped_patch(id, fields)))
    }

    /// Deletes a group; its securities become ungrouped.
    pub fn delete_group(&self, id: &str) -> CoreResult<Operation> {
        self.require_group(id)?;
        self.execute(OperationKind::DeleteGroup(EntityRef::new(id)))
    }

    // ----- Settings -----

    /// Upserts a setting.
    pub fn update_setting(&self, key: &str, value: Value) -> CoreResult<Operation> {
        self.execute(OperationKind::UpdateSetting(Setting {
            key: key.to_string(),
            value,
        }))
    }

    // ----- Queries -----

    /// Returns a security by id.
    #[must_use]
    pub fn security(&self, id: &str) -> Option<Security> {
        self.read(|s| s.tables.securities.get(id).cloned())
    }

    /// Returns all securities ordered by id.
    #[must_use]
    pub fn securities(&self) -> Vec<Security> {
        self.read(|s| s.tables.securities.values().cloned().collect())
    }

    /// Returns the notes of a security.
    #[must_use]
    pub fn notes_for(&self, security_id: &str) -> Vec<Note> {
        self.read(|s| s.tables.notes_for(security_id).cloned().collect())
    }

    /// Returns all groups ordered by id.
    #[must_use]
    pub fn groups(&self) -> Vec<Group> {
        self.read(|s| s.tables.groups.values().cloned().collect())
    }

    /// Returns a setting value.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<Value> {
        self.read(|s| s.tables.settings.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tickernotes_protocol::DeviceId;

    fn store() -> LocalStore {
        LocalStore::in_memory(DeviceId::new("device-test"))
    }

    #[test]
    fn generated_ids_have_prefix_and_differ() {
        let a = generate_id("sec");
        let b = generate_id("sec");
        assert!(a.starts_with("sec-"));
        assert_ne!(a, b);
        assert_eq!(a.rsplit('-').next().unwrap().len(), 9);
    }

    #[test]
    fn security_lifecycle() {
        let store = store();
        let group = store.add_group("Tech").unwrap();
        let sec = store.add_security("AAPL", Some("Apple")).unwrap();
        assert!(sec.created_at.is_some());

        store.move_security_to_group(&sec.id, Some(&group.id)).unwrap();
        store.toggle_security_active(&sec.id, false).unwrap();
        store
            .update_purchase(&sec.id, Some("2023-01-02".into()), Some(130.0), Some(10.0))
            .unwrap();

        let mut fields = Map::new();
        fields.insert("name".into(), json!("Apple Inc."));
        store.update_security(&sec.id, fields).unwrap();

        let stored = store.security(&sec.id).unwrap();
        assert_eq!(stored.group_id.as_deref(), Some(group.id.as_str()));
        assert!(!stored.is_active);
        assert_eq!(stored.first_quantity, Some(10.0));
        assert_eq!(stored.name.as_deref(), Some("Apple Inc."));
        assert!(stored.updated_at.is_some());

        assert_eq!(store.pending_count(), 6);
    }

    #[test]
    fn missing_targets_are_not_found() {
        let store = store();
        assert!(matches!(
            store.add_note("sec-404", "x"),
            Err(CoreError::NotFound { entity: "security", .. })
        ));
        assert!(matches!(
            store.update_group("grp-404", "x"),
            Err(CoreError::NotFound { entity: "group", .. })
        ));
        let sec = store.add_security("MSFT", None).unwrap();
        assert!(store.move_security_to_group(&sec.id, Some("grp-404")).is_err());
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn notes_and_cascade() {
        let store = store();
        let sec = store.add_security("NVDA", None).unwrap();
        let note = store.add_note(&sec.id, "first").unwrap();
        store.add_note(&sec.id, "second").unwrap();
        store.update_note(&note.id, "edited").unwrap();

        let notes = store.notes_for(&sec.id);
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().any(|n| n.content == "edited"));

        store.delete_security(&sec.id).unwrap();
        assert!(store.notes_for(&sec.id).is_empty());
        assert!(store.tables().notes.is_empty());
    }

    #[test]
    fn group_delete_and_bulk() {
        let store = store();
        let group = store.add_group("Energy").unwrap();
        let a = store.add_security("XOM", None).unwrap();
        let b = store.add_security("CVX", None).unwrap();
        let ids = vec![a.id.clone(), b.id.clone()];

        store.bulk_move_securities(&ids, Some(&group.id)).unwrap();
        assert!(store.securities().iter().all(|s| s.group_id.is_some()));

        store.delete_group(&group.id).unwrap();
        assert!(store.groups().is_empty());
        assert!(store.securities().iter().all(|s| s.group_id.is_none()));

        store.bulk_delete_securities(&ids).unwrap();
        assert!(store.securities().is_empty());
    }

    #[test]
    fn settings_upsert() {
        let store = store();
        store.update_setting("theme", json!("dark")).unwrap();
        store.update_setting("theme", json!("light")).unwrap();
        assert_eq!(store.setting("theme"), Some(json!("light")));
        assert_eq!(store.setting("missing"), None);
    }
}
