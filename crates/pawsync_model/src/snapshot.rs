//! The home snapshot aggregate.

use crate::booking::{Booking, CalendarEvent};
use crate::community::{CommunityEvent, CommunityPost, DirectMessage, Group, Notification};
use crate::provider::Provider;
use crate::quote::QuoteBundle;
use serde::{Deserialize, Serialize};

/// Point-in-time bundle of every collection the home screens need.
///
/// A snapshot is produced wholesale by a successful sync and is never
/// patched in place; local overlays are applied to a copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeSnapshot {
    /// Catalog listings plus the viewer's own listings (including cancelled).
    pub providers: Vec<Provider>,
    /// Groups with the viewer's membership.
    pub groups: Vec<Group>,
    /// Community posts.
    pub posts: Vec<CommunityPost>,
    /// Community events.
    pub events: Vec<CommunityEvent>,
    /// Bookings the viewer made.
    pub owner_bookings: Vec<Booking>,
    /// Bookings on listings the viewer owns.
    pub provider_bookings: Vec<Booking>,
    /// Calendar entries for the selected role.
    pub calendar: Vec<CalendarEvent>,
    /// Quote requests the viewer sent or was targeted by.
    #[serde(default)]
    pub quotes: Vec<QuoteBundle>,
    /// Direct messages involving the viewer.
    #[serde(default)]
    pub messages: Vec<DirectMessage>,
    /// Notifications for the viewer.
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl HomeSnapshot {
    /// Finds a provider by ID.
    pub fn provider(&self, provider_id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == provider_id)
    }

    /// Finds a booking by ID on either side.
    pub fn booking(&self, booking_id: &str) -> Option<&Booking> {
        self.bookings().find(|b| b.id == booking_id)
    }

    /// Iterates owner-side then provider-side bookings.
    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.owner_bookings.iter().chain(self.provider_bookings.iter())
    }

    /// Replaces every copy of a booking and returns true if one was found.
    pub fn replace_booking(&mut self, booking: &Booking) -> bool {
        let mut found = false;
        for slot in self
            .owner_bookings
            .iter_mut()
            .chain(self.provider_bookings.iter_mut())
        {
            if slot.id == booking.id {
                *slot = booking.clone();
                found = true;
            }
        }
        found
    }

    /// Inserts or replaces a provider by ID.
    pub fn upsert_provider(&mut self, provider: Provider) {
        match self.providers.iter_mut().find(|p| p.id == provider.id) {
            Some(slot) => *slot = provider,
            None => self.providers.push(provider),
        }
    }

    /// Inserts or replaces a quote bundle by request ID.
    pub fn upsert_quote(&mut self, bundle: QuoteBundle) {
        match self
            .quotes
            .iter_mut()
            .find(|q| q.request.id == bundle.request.id)
        {
            Some(slot) => *slot = bundle,
            None => self.quotes.push(bundle),
        }
    }

    /// Total number of entities across collections.
    pub fn entity_count(&self) -> usize {
        self.providers.len()
            + self.groups.len()
            + self.posts.len()
            + self.events.len()
            + self.owner_bookings.len()
            + self.provider_bookings.len()
            + self.calendar.len()
            + self.quotes.len()
            + self.messages.len()
            + self.notifications.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingStatus;
    use chrono::NaiveDate;

    fn booking(id: &str, status: BookingStatus) -> Booking {
        Booking {
            id: id.into(),
            owner_user_id: "user_2".into(),
            provider_id: "p1".into(),
            pet_name: "Milo".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            time_slot: "09:00".into(),
            note: String::new(),
            status,
        }
    }

    #[test]
    fn replace_booking_updates_both_sides() {
        let mut snapshot = HomeSnapshot {
            owner_bookings: vec![booking("b1", BookingStatus::Requested)],
            provider_bookings: vec![booking("b1", BookingStatus::Requested)],
            ..Default::default()
        };
        assert!(snapshot.replace_booking(&booking("b1", BookingStatus::ProviderConfirmed)));
        assert!(snapshot
            .bookings()
            .all(|b| b.status == BookingStatus::ProviderConfirmed));
        assert!(!snapshot.replace_booking(&booking("b9", BookingStatus::Requested)));
    }

    #[test]
    fn empty_snapshot_counts_zero() {
        assert_eq!(HomeSnapshot::default().entity_count(), 0);
    }
}
