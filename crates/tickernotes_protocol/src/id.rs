//! Device, operation and time identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a device participating in sync.
///
/// Device IDs are opaque strings generated once per local datastore and
/// never changed afterwards. They may contain `-`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device ID from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random device ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("device-{}", Uuid::new_v4()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Globally unique identity of an operation: `(device, seq)`.
///
/// On the wire and in persisted metadata it is written as `"{device}-{seq}"`.
/// Parsing splits on the *last* `-`, so device IDs containing dashes
/// round-trip.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId {
    /// Device that recorded the operation.
    pub device: DeviceId,
    /// Per-device sequence number.
    pub seq: u64,
}

impl OperationId {
    /// Creates an operation ID.
    pub fn new(device: DeviceId, seq: u64) -> Self {
        Self { device, seq }
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({}-{})", self.device, self.seq)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.device, self.seq)
    }
}

impl FromStr for OperationId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device, seq) = s
            .rsplit_once('-')
            .ok_or_else(|| ProtocolError::InvalidOperationId(s.to_string()))?;
        if device.is_empty() {
            return Err(ProtocolError::InvalidOperationId(s.to_string()));
        }
        let seq = seq
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidOperationId(s.to_string()))?;
        Ok(Self::new(DeviceId::new(device), seq))
    }
}

impl Serialize for OperationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OperationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An ISO-8601 UTC timestamp with millisecond precision.
///
/// Timestamps are kept in their string form (`2024-05-01T12:00:00.000Z`).
/// Because every timestamp produced here has the same width, string order is
/// chronological order, which is what merge ordering relies on.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Returns the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Formats a chrono datetime.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Wraps an already formatted timestamp string without validating it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parses the timestamp into a chrono datetime.
    pub fn to_datetime(&self) -> ProtocolResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ProtocolError::InvalidTimestamp(self.0.clone()))
    }

    /// Returns the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_device_ids_are_unique() {
        let a = DeviceId::generate();
        let b = DeviceId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("device-"));
    }

    #[test]
    fn operation_id_display_and_parse() {
        let id = OperationId::new(DeviceId::new("browser-1a2b-3c4d"), 42);
        let s = id.to_string();
        assert_eq!(s, "browser-1a2b-3c4d-42");

        let parsed: OperationId = s.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn operation_id_rejects_garbage() {
        assert!("nodash".parse::<OperationId>().is_err());
        assert!("device-abc".parse::<OperationId>().is_err());
        assert!("-7".parse::<OperationId>().is_err());
    }

    #[test]
    fn operation_id_serializes_as_string() {
        let id = OperationId::new(DeviceId::new("a"), 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"a-3\"");
        let back: OperationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn timestamp_string_order_is_chronological() {
        let earlier = Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap());
        let later = Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap());
        assert!(earlier < later);
        assert_eq!(earlier.as_str(), "2024-01-09T23:00:00.000Z");
    }

    #[test]
    fn timestamp_parses_back() {
        let ts = Timestamp::from_raw("2024-03-01T10:15:00.250Z");
        let dt = ts.to_datetime().unwrap();
        assert_eq!(Timestamp::from_datetime(dt), ts);

        assert!(Timestamp::from_raw("yesterday").to_datetime().is_err());
    }
}
