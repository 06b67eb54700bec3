//! Holds, bookings and the booking state machine.

use crate::error::{require, ModelError, ModelResult};
use crate::ids::SlotKey;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a booking.
///
/// ```text
/// requested ──► provider_confirmed ──► in_progress ──► completed
///     │                 │
///     │                 └──► reschedule_requested ──► rescheduled ──► requested
///     └──► provider_declined | cancelled_by_owner | cancelled_by_provider
/// ```
///
/// Declined, completed and both cancellations are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Awaiting provider response.
    Requested,
    /// Accepted by the provider.
    ProviderConfirmed,
    /// Declined by the provider.
    ProviderDeclined,
    /// Service under way.
    InProgress,
    /// Service delivered.
    Completed,
    /// Cancelled by the pet owner.
    CancelledByOwner,
    /// Cancelled by the provider.
    CancelledByProvider,
    /// Owner asked for a different slot.
    RescheduleRequested,
    /// Provider agreed to move the slot.
    Rescheduled,
}

/// Which side of a booking may apply a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorRole {
    /// The user who owns the provider listing.
    ProviderOwner,
    /// The user who made the booking.
    BookingOwner,
}

impl BookingStatus {
    /// All statuses, in declaration order.
    pub const ALL: [BookingStatus; 9] = [
        BookingStatus::Requested,
        BookingStatus::ProviderConfirmed,
        BookingStatus::ProviderDeclined,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::CancelledByOwner,
        BookingStatus::CancelledByProvider,
        BookingStatus::RescheduleRequested,
        BookingStatus::Rescheduled,
    ];

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::ProviderDeclined
                | BookingStatus::Completed
                | BookingStatus::CancelledByOwner
                | BookingStatus::CancelledByProvider
        )
    }

    /// Returns true if a booking in this status occupies its slot.
    pub fn occupies_slot(&self) -> bool {
        matches!(
            self,
            BookingStatus::Requested
                | BookingStatus::ProviderConfirmed
                | BookingStatus::InProgress
                | BookingStatus::RescheduleRequested
                | BookingStatus::Rescheduled
        )
    }

    /// Returns true if this is one of the two cancellation statuses.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            BookingStatus::CancelledByOwner | BookingStatus::CancelledByProvider
        )
    }

    /// Statuses reachable from this one.
    pub fn successors(&self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Requested => &[
                ProviderConfirmed,
                ProviderDeclined,
                CancelledByOwner,
                CancelledByProvider,
            ],
            ProviderConfirmed => &[
                InProgress,
                CancelledByOwner,
                CancelledByProvider,
                RescheduleRequested,
            ],
            InProgress => &[Completed, CancelledByProvider],
            RescheduleRequested => &[Rescheduled, CancelledByOwner, CancelledByProvider],
            Rescheduled => &[
                Requested,
                ProviderConfirmed,
                CancelledByOwner,
                CancelledByProvider,
            ],
            ProviderDeclined | Completed | CancelledByOwner | CancelledByProvider => &[],
        }
    }

    /// Returns true if `next` is a legal successor.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        self.successors().contains(&next)
    }

    /// The side allowed to move a booking into this status.
    pub fn required_actor(&self) -> ActorRole {
        match self {
            BookingStatus::CancelledByOwner
            | BookingStatus::RescheduleRequested
            | BookingStatus::Requested => ActorRole::BookingOwner,
            _ => ActorRole::ProviderOwner,
        }
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Requested => "requested",
            BookingStatus::ProviderConfirmed => "provider_confirmed",
            BookingStatus::ProviderDeclined => "provider_declined",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::CancelledByOwner => "cancelled_by_owner",
            BookingStatus::CancelledByProvider => "cancelled_by_provider",
            BookingStatus::RescheduleRequested => "reschedule_requested",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| ModelError::UnknownVariant {
                kind: "booking status",
                value: s.to_string(),
            })
    }
}

/// A short-lived advisory reservation of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingHold {
    /// Hold ID.
    pub id: String,
    /// Held provider.
    pub provider_id: String,
    /// User who placed the hold.
    pub owner_user_id: String,
    /// Slot date.
    pub date: NaiveDate,
    /// Slot start time.
    pub time_slot: String,
    /// When the hold lapses.
    pub expires_at: DateTime<Utc>,
}

impl BookingHold {
    /// The reserved tuple.
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            provider_id: self.provider_id.clone(),
            date: self.date,
            time_slot: self.time_slot.clone(),
        }
    }

    /// Returns true once `now` has reached `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Returns true if the hold covers `slot` and is still live at `now`.
    pub fn covers(&self, slot: &SlotKey, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
            && self.provider_id == slot.provider_id
            && self.date == slot.date
            && self.time_slot == slot.time_slot
    }
}

/// Body of `POST bookings/holds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldRequest {
    /// Requesting user.
    pub user_id: String,
    /// Provider to hold.
    pub provider_id: String,
    /// Slot date.
    pub date: NaiveDate,
    /// Slot start time.
    pub time_slot: String,
}

impl HoldRequest {
    /// Builds a hold request for a slot.
    pub fn new(slot: &SlotKey, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            provider_id: slot.provider_id.clone(),
            date: slot.date,
            time_slot: slot.time_slot.clone(),
        }
    }
}

/// A booking of a provider slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking ID.
    pub id: String,
    /// Pet owner who booked.
    pub owner_user_id: String,
    /// Booked provider.
    pub provider_id: String,
    /// Pet being serviced.
    #[serde(default)]
    pub pet_name: String,
    /// Slot date.
    pub date: NaiveDate,
    /// Slot start time.
    pub time_slot: String,
    /// Free-text note.
    #[serde(default)]
    pub note: String,
    /// Current status.
    pub status: BookingStatus,
}

impl Booking {
    /// The booked tuple.
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            provider_id: self.provider_id.clone(),
            date: self.date,
            time_slot: self.time_slot.clone(),
        }
    }

    /// Returns true if this booking blocks `slot`.
    pub fn occupies(&self, slot: &SlotKey) -> bool {
        self.status.occupies_slot()
            && self.provider_id == slot.provider_id
            && self.date == slot.date
            && self.time_slot == slot.time_slot
    }
}

/// Body of `POST bookings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Requesting user.
    pub user_id: String,
    /// Provider to book.
    pub provider_id: String,
    /// Pet being serviced.
    pub pet_name: String,
    /// Slot date.
    pub date: NaiveDate,
    /// Slot start time.
    pub time_slot: String,
    /// Free-text note.
    pub note: String,
}

impl BookingRequest {
    /// Checks required fields.
    pub fn validate(&self) -> ModelResult<()> {
        require("user_id", &self.user_id)?;
        require("provider_id", &self.provider_id)?;
        require("pet_name", &self.pet_name)?;
        Ok(())
    }

    /// The requested tuple.
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            provider_id: self.provider_id.clone(),
            date: self.date,
            time_slot: self.time_slot.clone(),
        }
    }
}

/// Body of `POST bookings/{id}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingStatusUpdate {
    /// Acting user.
    pub actor_user_id: String,
    /// Requested status.
    pub status: BookingStatus,
    /// Optional note.
    #[serde(default)]
    pub note: String,
}

/// Perspective used when listing bookings and calendar entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarRole {
    /// Bookings the user made.
    #[default]
    Owner,
    /// Bookings on listings the user owns.
    Provider,
}

impl CalendarRole {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarRole::Owner => "owner",
            CalendarRole::Provider => "provider",
        }
    }
}

/// Kind of calendar entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarEventKind {
    /// A booking.
    Booking,
    /// A live hold.
    Hold,
    /// A provider blackout.
    Blackout,
}

/// A calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Entry ID.
    pub id: String,
    /// Entry kind.
    pub kind: CalendarEventKind,
    /// Title line.
    pub title: String,
    /// Subtitle line.
    #[serde(default)]
    pub subtitle: String,
    /// Date.
    pub date: NaiveDate,
    /// Slot start time.
    pub time_slot: String,
    /// Status label.
    pub status: String,
    /// Related provider.
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Related booking.
    #[serde(default)]
    pub booking_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        for status in BookingStatus::ALL {
            assert_eq!(status.is_terminal(), status.successors().is_empty());
        }
    }

    #[test]
    fn cancellation_never_reaches_confirmed() {
        for status in [
            BookingStatus::CancelledByOwner,
            BookingStatus::CancelledByProvider,
        ] {
            assert!(status.is_cancellation());
            assert!(!status.can_transition_to(BookingStatus::ProviderConfirmed));
            assert!(!status.occupies_slot());
        }
    }

    #[test]
    fn reschedule_branch_returns_to_requested() {
        assert!(BookingStatus::ProviderConfirmed
            .can_transition_to(BookingStatus::RescheduleRequested));
        assert!(BookingStatus::RescheduleRequested.can_transition_to(BookingStatus::Rescheduled));
        assert!(BookingStatus::Rescheduled.can_transition_to(BookingStatus::Requested));
        assert!(!BookingStatus::Requested.can_transition_to(BookingStatus::Completed));
    }

    #[test]
    fn actor_roles() {
        assert_eq!(
            BookingStatus::ProviderConfirmed.required_actor(),
            ActorRole::ProviderOwner
        );
        assert_eq!(
            BookingStatus::CancelledByOwner.required_actor(),
            ActorRole::BookingOwner
        );
        assert_eq!(
            BookingStatus::CancelledByProvider.required_actor(),
            ActorRole::ProviderOwner
        );
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("lost".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn hold_expiry_and_coverage() {
        let now = Utc::now();
        let hold = BookingHold {
            id: "hold_1".into(),
            provider_id: "p1".into(),
            owner_user_id: "user_2".into(),
            date: date(),
            time_slot: "09:00".into(),
            expires_at: now + Duration::minutes(15),
        };
        let slot = SlotKey::new("p1", date(), "09:00").unwrap();
        assert!(hold.covers(&slot, now));
        assert!(!hold.covers(&slot, now + Duration::minutes(15)));
        assert!(!hold.covers(&SlotKey::new("p1", date(), "10:00").unwrap(), now));
    }

    #[test]
    fn booking_occupies_only_when_active() {
        let mut booking = Booking {
            id: "b1".into(),
            owner_user_id: "user_2".into(),
            provider_id: "p1".into(),
            pet_name: "Milo".into(),
            date: date(),
            time_slot: "09:00".into(),
            note: String::new(),
            status: BookingStatus::Requested,
        };
        let slot = booking.slot_key();
        assert!(booking.occupies(&slot));
        booking.status = BookingStatus::CancelledByOwner;
        assert!(!booking.occupies(&slot));
    }

    proptest::proptest! {
        #[test]
        fn random_walk_stays_cancelled(steps in proptest::collection::vec(0usize..9, 1..40)) {
            let mut status = BookingStatus::Requested;
            let mut cancelled = false;
            for step in steps {
                let next = BookingStatus::ALL[step];
                if status.can_transition_to(next) {
                    status = next;
                }
                cancelled |= status.is_cancellation();
                if cancelled {
                    proptest::prop_assert!(status.is_cancellation());
                    proptest::prop_assert_ne!(status, BookingStatus::ProviderConfirmed);
                }
            }
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&BookingStatus::CancelledByProvider).unwrap();
        assert_eq!(json, "\"cancelled_by_provider\"");
    }
}
