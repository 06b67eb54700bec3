//! The viewer's own listings and favorite providers.

use pawsync_model::{HomeSnapshot, Provider};
use std::collections::HashSet;

/// Listings owned by `user_id`, cancelled ones included so they can be
/// restored. Status is passed through unchanged.
pub fn my_listings(providers: &[Provider], user_id: &str) -> Vec<Provider> {
    providers
        .iter()
        .filter(|p| p.is_owned_by(user_id))
        .cloned()
        .collect()
}

/// Active providers `user_id` has booked, most recent booking first.
pub fn favorites(snapshot: &HomeSnapshot, user_id: &str) -> Vec<Provider> {
    let mut bookings: Vec<_> = snapshot
        .owner_bookings
        .iter()
        .filter(|b| b.owner_user_id == user_id)
        .collect();
    bookings.sort_by(|a, b| {
        (b.date, &b.time_slot, &b.id).cmp(&(a.date, &a.time_slot, &a.id))
    });

    let mut seen = HashSet::new();
    bookings
        .into_iter()
        .filter(|b| seen.insert(b.provider_id.as_str()))
        .filter_map(|b| snapshot.provider(&b.provider_id))
        .filter(|p| p.is_active() && !p.is_owned_by(user_id))
        .cloned()
        .collect()
}
