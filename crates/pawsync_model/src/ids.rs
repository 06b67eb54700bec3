//! Identifier types shared across entities.

use crate::error::{ModelError, ModelResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Client-generated idempotency key attached to every locally originated write.
///
/// The server echoes it on the entity it creates, which is how a buffered
/// local entity is matched with its server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientRef(Uuid);

impl ClientRef {
    /// Generates a new random reference.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Local entity id derived from this reference (`local_<uuid>`).
    pub fn local_id(&self) -> String {
        format!("local_{}", self.0.simple())
    }
}

impl Default for ClientRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A reservable (provider, date, slot) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    /// Provider being reserved.
    pub provider_id: String,
    /// Calendar date of the slot.
    pub date: NaiveDate,
    /// Start time in `HH:MM` form.
    pub time_slot: String,
}

impl SlotKey {
    /// Creates a slot key, validating the `HH:MM` time slot.
    pub fn new(
        provider_id: impl Into<String>,
        date: NaiveDate,
        time_slot: impl Into<String>,
    ) -> ModelResult<Self> {
        let time_slot = time_slot.into();
        chrono::NaiveTime::parse_from_str(&time_slot, "%H:%M")
            .map_err(|_| ModelError::InvalidTimeSlot(time_slot.clone()))?;
        Ok(Self {
            provider_id: provider_id.into(),
            date,
            time_slot,
        })
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.provider_id, self.date, self.time_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_id_is_prefixed() {
        let client_ref = ClientRef::new();
        assert!(client_ref.local_id().starts_with("local_"));
        assert_eq!(client_ref.local_id(), client_ref.local_id());
    }

    #[test]
    fn slot_key_validates_time() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(SlotKey::new("p1", date, "09:00").is_ok());
        assert_eq!(
            SlotKey::new("p1", date, "9am"),
            Err(ModelError::InvalidTimeSlot("9am".into()))
        );
    }

    #[test]
    fn client_ref_serializes_as_plain_uuid() {
        let client_ref = ClientRef::new();
        let json = serde_json::to_string(&client_ref).unwrap();
        assert_eq!(json, format!("\"{}\"", client_ref));
    }
}
