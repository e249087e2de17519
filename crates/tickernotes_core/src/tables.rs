//! Entity tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tickernotes_protocol::{Group, Note, Security, Setting, SnapshotData};

/// The local entity tables, keyed by id (settings by key).
///
/// Tables are ordered maps so that two replicas holding the same records
/// compare equal and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityTables {
    /// Securities by id.
    pub securities: BTreeMap<String, Security>,
    /// Notes by id.
    pub notes: BTreeMap<String, Note>,
    /// Groups by id.
    pub groups: BTreeMap<String, Group>,
    /// Setting values by key.
    pub settings: BTreeMap<String, Value>,
}

impl EntityTables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if every table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
            && self.notes.is_empty()
            && self.groups.is_empty()
            && self.settings.is_empty()
    }

    /// Returns the notes attached to a security.
    pub fn notes_for<'a>(&'a self, security_id: &'a str) -> impl Iterator<Item = &'a Note> + 'a {
        self.notes
            .values()
            .filter(move |note| note.security_id == security_id)
    }

    /// Returns the securities in a group.
    pub fn securities_in<'a>(
        &'a self,
        group_id: &'a str,
    ) -> impl Iterator<Item = &'a Security> + 'a {
        self.securities
            .values()
            .filter(move |sec| sec.group_id.as_deref() == Some(group_id))
    }

    /// Captures the tables as snapshot data.
    #[must_use]
    pub fn to_snapshot_data(&self) -> SnapshotData {
        SnapshotData {
            securities: self.securities.values().cloned().collect(),
            notes: self.notes.values().cloned().collect(),
            groups: self.groups.values().cloned().collect(),
            settings: self
                .settings
                .iter()
                .map(|(key, value)| Setting {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    /// Builds tables from snapshot data.
    #[must_use]
    pub fn from_snapshot_data(data: &SnapshotData) -> Self {
        Self {
            securities: data
                .securities
                .iter()
                .map(|s| (s.id.clone(), s.clone()))
                .collect(),
            notes: data.notes.iter().map(|n| (n.id.clone(), n.clone())).collect(),
            groups: data.groups.iter().map(|g| (g.id.clone(), g.clone())).collect(),
            settings: data
                .settings
                .iter()
                .map(|s| (s.key.clone(), s.value.clone()))
                .collect(),
        }
    }
}
