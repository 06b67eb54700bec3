//! Property-based test generators using proptest.
//!
//! Strategies produce values that already satisfy the model's field rules
//! (valid `HH:MM` slots, non-empty pet names) so properties exercise the
//! engine rather than input validation.

use crate::fixtures::date;
use chrono::{Duration, NaiveDate};
use pawsync_model::{BookingStatus, CommunityPost, PostKind, SlotKey};
use proptest::prelude::*;

/// Every booking status.
pub const ALL_STATUSES: [BookingStatus; 9] = [
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

/// Strategy for booking statuses.
pub fn booking_status_strategy() -> impl Strategy<Value = BookingStatus> {
    prop::sample::select(ALL_STATUSES.to_vec())
}

/// Strategy for dates in the first half of 2026.
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..180).prop_map(|offset| date(2026, 1, 1) + Duration::days(offset))
}

/// Strategy for on-the-hour slot keys of a handful of providers.
pub fn slot_key_strategy() -> impl Strategy<Value = SlotKey> {
    (
        prop::sample::select(vec!["p1", "p2", "p3", "p4"]),
        date_strategy(),
        7u32..20,
    )
        .prop_map(|(provider, date, hour)| SlotKey {
            provider_id: provider.to_string(),
            date,
            time_slot: format!("{hour:02}:00"),
        })
}

/// Strategy for a pair of distinct user IDs.
pub fn user_pair_strategy() -> impl Strategy<Value = (String, String)> {
    (1u32..50, 1u32..50)
        .prop_filter("users must differ", |(a, b)| a != b)
        .prop_map(|(a, b)| (format!("user_{a}"), format!("user_{b}")))
}

/// Strategy for pet names, with occasional surrounding whitespace.
pub fn pet_name_strategy() -> impl Strategy<Value = String> {
    (
        prop::string::string_regex("[A-Z][a-z]{2,8}").expect("Invalid regex"),
        any::<bool>(),
    )
        .prop_map(|(name, padded)| if padded { format!(" {name} ") } else { name })
}

/// Strategy for lists of pet posts spread over a few suburbs and the first
/// weeks of 2026. Post IDs are unique.
pub fn pet_posts_strategy(max: usize) -> impl Strategy<Value = Vec<CommunityPost>> {
    prop::collection::vec(
        (
            pet_name_strategy(),
            prop::sample::select(vec!["Newtown", "Glebe", "newtown ", "Bondi"]),
            0i64..(30 * 24),
        ),
        0..max,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (pet, suburb, hours))| CommunityPost {
                id: format!("post_{i}"),
                kind: PostKind::GroupPost,
                title: String::new(),
                body: String::new(),
                suburb: suburb.to_string(),
                author_user_id: None,
                group_id: None,
                pet_name: Some(pet),
                photo_url: None,
                created_at: crate::fixtures::at(2026, 2, 1, 0, 0) + Duration::hours(hours),
                client_ref: None,
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, Utc};
    use pawsync_engine::views::{pet_roster, roster_candidates};

    proptest! {
        #[test]
        fn slot_keys_are_valid(slot in slot_key_strategy()) {
            prop_assert!(SlotKey::new(&slot.provider_id, slot.date, &slot.time_slot).is_ok());
        }

        #[test]
        fn terminal_statuses_have_no_successors(status in booking_status_strategy()) {
            if status.is_terminal() {
                for next in ALL_STATUSES {
                    prop_assert!(!status.can_transition_to(next));
                }
            }
        }

        #[test]
        fn roster_is_deterministic_and_bounded(
            posts in pet_posts_strategy(40),
            day in 1u32..28,
        ) {
            let candidates = roster_candidates(&posts, Utc.fix());
            let day = date(2026, 2, day);
            let first = pet_roster(&candidates, Some("Newtown"), day, 7, 8);
            let second = pet_roster(&candidates, Some(" newtown"), day, 7, 8);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.len() <= 8);
            for item in &first {
                prop_assert_eq!(item.suburb.trim().to_lowercase(), "newtown");
            }
        }
    }
}
