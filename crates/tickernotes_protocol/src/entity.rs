//! Entity records mutated by operations.
//!
//! Entities are plain records keyed by opaque client-generated string ids.
//! Fields this version does not know about are kept in `extra` so that a
//! record written by a newer device survives a round trip through an older
//! one.

use crate::id::Timestamp;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A tracked security (ticker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    /// Client-generated id (`sec-…`).
    pub id: String,
    /// Ticker symbol.
    #[serde(default)]
    pub symbol: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Group this security belongs to, if any.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Whether the security is actively tracked.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Date of the first purchase.
    #[serde(default)]
    pub first_purchase_date: Option<String>,
    /// Price of the first purchase.
    #[serde(default, deserialize_with = "lenient_number")]
    pub first_purchase_price: Option<f64>,
    /// Quantity of the first purchase.
    #[serde(default, deserialize_with = "lenient_number")]
    pub first_quantity: Option<f64>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Security {
    /// Creates an active security with only id and symbol set.
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: None,
            group_id: None,
            is_active: true,
            first_purchase_date: None,
            first_purchase_price: None,
            first_quantity: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

/// A free-text note attached to a security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Client-generated id (`note-…`).
    pub id: String,
    /// Security this note belongs to.
    pub security_id: String,
    /// Note body.
    #[serde(default)]
    pub content: String,
    /// Legacy "primary note" marker.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_primary: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    /// Creates a note.
    pub fn new(
        id: impl Into<String>,
        security_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            security_id: security_id.into(),
            content: content.into(),
            is_primary: false,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

/// A named group of securities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Client-generated id (`grp-…`).
    pub id: String,
    /// Group name.
    #[serde(default)]
    pub name: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Group {
    /// Creates a group.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

/// A key/value application setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Setting key.
    pub key: String,
    /// Arbitrary JSON value.
    #[serde(default)]
    pub value: Value,
}

fn default_true() -> bool {
    true
}

/// Accepts a number, a numeric string, an empty string or null.
///
/// Form input on some clients records prices as strings.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("not a number: {s:?}"))),
        other => Err(de::Error::custom(format!("expected number, got {other}"))),
    }
}

/// Merges `fields` into `record`, overwriting only the named fields.
///
/// The record is round-tripped through its JSON object form so that every
/// field, including unknown `extra` fields, can be patched by name.
pub fn merge_fields<T>(record: &T, fields: &Map<String, Value>) -> serde_json::Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(object) = &mut value {
        for (key, field) in fields {
            object.insert(key.clone(), field.clone());
        }
    }
    serde_json::from_value(value)
}
