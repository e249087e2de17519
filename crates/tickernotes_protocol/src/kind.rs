//! Operation kinds and their typed payloads.
//!
//! Every mutation a device can record is one variant of [`OperationKind`].
//! On the wire a kind is a type tag (`op`) plus a JSON payload (`data`).
//! Decoding accepts the legacy aliases older clients wrote; encoding always
//! uses the first (canonical) name. Tags this version does not recognise
//! decode to [`OperationKind::Unknown`] so old devices can keep replaying a
//! log written by newer ones.

use crate::entity::{lenient_number, Group, Note, Security, Setting};
use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Reference to a single entity by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    /// Target entity id.
    pub id: String,
}

impl EntityRef {
    /// Creates a reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    fn from_payload(op: &str, data: &Value, target_key: &str) -> ProtocolResult<Self> {
        target_id(data, target_key)
            .map(Self::new)
            .ok_or_else(|| missing_target(op, target_key))
    }
}

/// A partial update: only `fields` are written into the target record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityPatch {
    /// Target entity id.
    pub id: String,
    /// Fields to overwrite.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EntityPatch {
    /// Creates a patch. Any `id` key inside `fields` is dropped.
    pub fn new(id: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        fields.remove("id");
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Decodes a patch payload.
    ///
    /// The target is named by `target_key` (e.g. `security_id`) or `id`, the
    /// specific key winning. The fields are either the nested `data` object
    /// or the remaining top-level keys.
    fn from_payload(op: &str, data: Value, target_key: &str) -> ProtocolResult<Self> {
        let id = target_id(&data, target_key).ok_or_else(|| missing_target(op, target_key))?;

        let Value::Object(mut object) = data else {
            return Err(ProtocolError::invalid_payload(op, "payload is not an object"));
        };

        let mut fields = match object.remove("data") {
            Some(Value::Object(nested)) => nested,
            Some(other) => {
                object.insert("data".into(), other);
                object
            }
            None => object,
        };
        fields.remove(target_key);
        Ok(Self::new(id, fields))
    }
}

/// Payload of `toggle_security_active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleActive {
    /// Security id.
    pub id: String,
    /// New active flag.
    pub is_active: bool,
}

/// Payload of `update_purchase`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseUpdate {
    /// Security id.
    pub id: String,
    /// Date of the first purchase.
    #[serde(default)]
    pub first_purchase_date: Option<String>,
    /// Price of the first purchase.
    #[serde(default, deserialize_with = "lenient_number")]
    pub first_purchase_price: Option<f64>,
    /// Quantity of the first purchase.
    #[serde(default, deserialize_with = "lenient_number")]
    pub first_quantity: Option<f64>,
}

/// Payload of `toggle_primary_note`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TogglePrimary {
    /// Note id.
    pub id: String,
    /// New primary flag.
    pub is_primary: bool,
}

/// Payload of `move_security_to_group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMove {
    /// Security to move.
    pub security_id: String,
    /// Destination group; `None` removes the security from its group.
    pub group_id: Option<String>,
}

impl GroupMove {
    fn from_payload(op: &str, data: &Value) -> ProtocolResult<Self> {
        let security_id = target_id(data, "security_id")
            .ok_or_else(|| ProtocolError::invalid_payload(op, "missing security_id or id"))?;
        Ok(Self {
            security_id,
            group_id: optional_string(op, data, "group_id")?,
        })
    }
}

/// Payload of `bulk_move_securities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkMove {
    /// Securities to move.
    pub security_ids: Vec<String>,
    /// Destination group; `None` removes them from any group.
    #[serde(default)]
    pub group_id: Option<String>,
}

/// Payload of `bulk_delete_securities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDelete {
    /// Securities to delete (with their notes).
    pub security_ids: Vec<String>,
}

/// The closed set of mutations, each with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Upsert a security by id.
    AddSecurity(Security),
    /// Merge fields into an existing security.
    UpdateSecurity(EntityPatch),
    /// Delete a security and its notes.
    DeleteSecurity(EntityRef),
    /// Flip a security's active flag.
    ToggleSecurityActive(ToggleActive),
    /// Overwrite first-purchase details.
    UpdatePurchase(PurchaseUpdate),
    /// Upsert a note by id.
    AddNote(Note),
    /// Merge fields into an existing note.
    UpdateNote(EntityPatch),
    /// Delete a note.
    DeleteNote(EntityRef),
    /// Legacy: set a note's primary flag.
    TogglePrimaryNote(TogglePrimary),
    /// Upsert a group by id.
    AddGroup(Group),
    /// Merge fields into an existing group.
    UpdateGroup(EntityPatch),
    /// Delete a group, ungrouping its members.
    DeleteGroup(EntityRef),
    /// Reassign one security's group.
    MoveSecurityToGroup(GroupMove),
    /// Upsert a setting by key.
    UpdateSetting(Setting),
    /// Reassign the group of many securities.
    BulkMoveSecurities(BulkMove),
    /// Delete many securities and their notes.
    BulkDeleteSecurities(BulkDelete),
    /// A type tag this version does not understand.
    Unknown {
        /// The raw type tag.
        op: String,
        /// The raw payload.
        data: Value,
    },
}

impl OperationKind {
    /// Returns the canonical wire tag.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::AddSecurity(_) => "add_security",
            Self::UpdateSecurity(_) => "update_security",
            Self::DeleteSecurity(_) => "delete_security",
            Self::ToggleSecurityActive(_) => "toggle_security_active",
            Self::UpdatePurchase(_) => "update_purchase",
            Self::AddNote(_) => "add_note",
            Self::UpdateNote(_) => "update_note",
            Self::DeleteNote(_) => "delete_note",
            Self::TogglePrimaryNote(_) => "toggle_primary_note",
            Self::AddGroup(_) => "add_group",
            Self::UpdateGroup(_) => "update_group",
            Self::DeleteGroup(_) => "delete_group",
            Self::MoveSecurityToGroup(_) => "move_security_to_group",
            Self::UpdateSetting(_) => "update_setting",
            Self::BulkMoveSecurities(_) => "bulk_move_securities",
            Self::BulkDeleteSecurities(_) => "bulk_delete_securities",
            Self::Unknown { op, .. } => op,
        }
    }

    /// Returns the entity table this kind touches, for logging.
    #[must_use]
    pub fn entity(&self) -> &'static str {
        match self {
            Self::AddSecurity(_)
            | Self::UpdateSecurity(_)
            | Self::DeleteSecurity(_)
            | Self::ToggleSecurityActive(_)
            | Self::UpdatePurchase(_)
            | Self::MoveSecurityToGroup(_)
            | Self::BulkMoveSecurities(_)
            | Self::BulkDeleteSecurities(_) => "security",
            Self::AddNote(_)
            | Self::UpdateNote(_)
            | Self::DeleteNote(_)
            | Self::TogglePrimaryNote(_) => "note",
            Self::AddGroup(_) | Self::UpdateGroup(_) | Self::DeleteGroup(_) => "group",
            Self::UpdateSetting(_) => "setting",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Returns true for the forward-compatibility fallthrough.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    /// Decodes a kind from its wire tag and payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayload`] if the tag is known but the
    /// payload does not have the expected shape. Unknown tags never fail.
    pub fn decode(op: &str, data: Value) -> ProtocolResult<Self> {
        let kind = match op {
            "add_security" | "security_create" => Self::AddSecurity(typed(op, nested(data))?),
            "update_security" | "security_update" => {
                Self::UpdateSecurity(EntityPatch::from_payload(op, data, "security_id")?)
            }
            "delete_security" | "security_delete" => {
                Self::DeleteSecurity(EntityRef::from_payload(op, &data, "security_id")?)
            }
            "toggle_security_active" => Self::ToggleSecurityActive(typed(op, data)?),
            "update_purchase" => Self::UpdatePurchase(typed(op, data)?),
            "add_note" | "note_create" => Self::AddNote(typed(op, nested(data))?),
            "update_note" | "note_update" => {
                Self::UpdateNote(EntityPatch::from_payload(op, data, "note_id")?)
            }
            "delete_note" | "note_delete" => {
                Self::DeleteNote(EntityRef::from_payload(op, &data, "note_id")?)
            }
            "toggle_primary_note" => Self::TogglePrimaryNote(typed(op, data)?),
            "add_group" | "create_group" | "group_create" => {
                Self::AddGroup(typed(op, nested(data))?)
            }
            "update_group" | "group_update" => {
                Self::UpdateGroup(EntityPatch::from_payload(op, data, "group_id")?)
            }
            "delete_group" | "group_delete" => {
                Self::DeleteGroup(EntityRef::from_payload(op, &data, "group_id")?)
            }
            "move_security_to_group" | "update_security_group" => {
                Self::MoveSecurityToGroup(GroupMove::from_payload(op, &data)?)
            }
            "update_setting" => Self::UpdateSetting(typed(op, data)?),
            "bulk_move_securities" => Self::BulkMoveSecurities(typed(op, data)?),
            "bulk_delete_securities" => Self::BulkDeleteSecurities(typed(op, data)?),
            _ => Self::Unknown {
                op: op.to_string(),
                data,
            },
        };
        Ok(kind)
    }

    /// Encodes the payload as a JSON value.
    pub fn to_payload(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(PayloadRef(self))?)
    }
}

/// Serializes only the payload half of an [`OperationKind`].
pub(crate) struct PayloadRef<'a>(pub(crate) &'a OperationKind);

impl Serialize for PayloadRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            OperationKind::AddSecurity(p) => p.serialize(serializer),
            OperationKind::UpdateSecurity(p)
            | OperationKind::UpdateNote(p)
            | OperationKind::UpdateGroup(p) => p.serialize(serializer),
            OperationKind::DeleteSecurity(p)
            | OperationKind::DeleteNote(p)
            | OperationKind::DeleteGroup(p) => p.serialize(serializer),
            OperationKind::ToggleSecurityActive(p) => p.serialize(serializer),
            OperationKind::UpdatePurchase(p) => p.serialize(serializer),
            OperationKind::AddNote(p) => p.serialize(serializer),
            OperationKind::TogglePrimaryNote(p) => p.serialize(serializer),
            OperationKind::AddGroup(p) => p.serialize(serializer),
            OperationKind::MoveSecurityToGroup(p) => p.serialize(serializer),
            OperationKind::UpdateSetting(p) => p.serialize(serializer),
            OperationKind::BulkMoveSecurities(p) => p.serialize(serializer),
            OperationKind::BulkDeleteSecurities(p) => p.serialize(serializer),
            OperationKind::Unknown { data, .. } => data.serialize(serializer),
        }
    }
}

fn typed<T: DeserializeOwned>(op: &str, data: Value) -> ProtocolResult<T> {
    serde_json::from_value(data).map_err(|e| ProtocolError::invalid_payload(op, e.to_string()))
}

/// Create payloads may wrap the record in a `data` key.
fn nested(data: Value) -> Value {
    match data {
        Value::Object(mut object) if matches!(object.get("data"), Some(Value::Object(_))) => {
            object.remove("data").unwrap_or(Value::Object(Map::new()))
        }
        other => other,
    }
}

fn target_id(data: &Value, target_key: &str) -> Option<String> {
    data.get(target_key)
        .and_then(Value::as_str)
        .or_else(|| data.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

fn missing_target(op: &str, target_key: &str) -> ProtocolError {
    ProtocolError::invalid_payload(op, format!("missing {target_key} or id"))
}

fn optional_string(op: &str, data: &Value, key: &str) -> ProtocolResult<Option<String>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ProtocolError::invalid_payload(
            op,
            format!("{key} must be a string or null, got {other}"),
        )),
    }
}
