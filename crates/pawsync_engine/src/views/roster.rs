//! Daily pet roster rotation.
//!
//! The roster is a "recently active pets" strip. Its order is a stable hash
//! of `(day, scope, item)`, so it is fixed for a given scope and calendar
//! day and reshuffles at midnight. Nothing here reads the wall clock.

use chrono::{Days, FixedOffset, NaiveDate};
use pawsync_model::CommunityPost;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Scope seed used when no suburb is selected.
pub const ALL_SCOPE: &str = "all";

/// A pet eligible for the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PetRosterItem {
    /// Source post ID.
    pub id: String,
    /// Pet name.
    pub pet_name: String,
    /// Photo, if the post had one.
    pub photo_url: Option<String>,
    /// Suburb of the post.
    pub suburb: String,
    /// Day the pet was added.
    pub added_on: NaiveDate,
}

/// Extracts roster candidates from posts that name a pet. Repeat posts about
/// the same pet in the same suburb keep only the latest.
///
/// `offset` maps post timestamps onto calendar days and must be the zone
/// the roster's `day` is taken in.
pub fn roster_candidates(posts: &[CommunityPost], offset: FixedOffset) -> Vec<PetRosterItem> {
    let mut latest: HashMap<(String, String), &CommunityPost> = HashMap::new();
    for post in posts {
        let Some(pet_name) = post.pet_name.as_deref().map(str::trim) else {
            continue;
        };
        if pet_name.is_empty() {
            continue;
        }
        let key = (pet_name.to_lowercase(), normalize_scope(&post.suburb));
        let keep = latest.get(&key).map_or(true, |seen| {
            (post.created_at, &post.id) > (seen.created_at, &seen.id)
        });
        if keep {
            latest.insert(key, post);
        }
    }
    let mut items: Vec<PetRosterItem> = latest
        .into_values()
        .map(|post| PetRosterItem {
            id: post.id.clone(),
            pet_name: post.pet_name.as_deref().unwrap_or_default().trim().to_string(),
            photo_url: post.photo_url.clone(),
            suburb: post.suburb.clone(),
            added_on: post.created_at.with_timezone(&offset).date_naive(),
        })
        .collect();
    items.sort_by(|a, b| a.id.cmp(&b.id));
    items
}

fn normalize_scope(scope: &str) -> String {
    scope.trim().to_lowercase()
}

/// Rotation key of one item for a day and scope.
pub fn rotation_key(day: NaiveDate, scope_seed: &str, item_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(day.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(scope_seed.as_bytes());
    hasher.update([0u8]);
    hasher.update(item_id.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Selects the roster for `scope` on `day`.
///
/// Keeps items added within the `window_days` days ending at `day`
/// (inclusive), restricted to the scope's suburb when one is given, orders
/// them by [`rotation_key`] and truncates to `display_count`.
pub fn pet_roster(
    candidates: &[PetRosterItem],
    scope: Option<&str>,
    day: NaiveDate,
    window_days: u32,
    display_count: usize,
) -> Vec<PetRosterItem> {
    let scope_seed = scope
        .map(normalize_scope)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| ALL_SCOPE.to_string());
    let window_start = day
        .checked_sub_days(Days::new(u64::from(window_days.max(1) - 1)))
        .unwrap_or(NaiveDate::MIN);

    let mut selected: Vec<(u64, &PetRosterItem)> = candidates
        .iter()
        .filter(|item| item.added_on >= window_start && item.added_on <= day)
        .filter(|item| scope_seed == ALL_SCOPE || normalize_scope(&item.suburb) == scope_seed)
        .map(|item| (rotation_key(day, &scope_seed, &item.id), item))
        .collect();
    selected.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
    selected
        .into_iter()
        .take(display_count)
        .map(|(_, item)| item.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, TimeZone, Utc};
    use pawsync_model::PostKind;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn item(id: usize, suburb: &str, added: NaiveDate) -> PetRosterItem {
        PetRosterItem {
            id: format!("post_{id}"),
            pet_name: format!("Pet {id}"),
            photo_url: None,
            suburb: suburb.into(),
            added_on: added,
        }
    }

    fn post(id: &str, pet: Option<&str>, suburb: &str, hour: u32) -> CommunityPost {
        CommunityPost {
            id: id.into(),
            kind: PostKind::GroupPost,
            title: "Walk".into(),
            body: String::new(),
            suburb: suburb.into(),
            author_user_id: None,
            group_id: None,
            pet_name: pet.map(str::to_string),
            photo_url: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
            client_ref: None,
        }
    }

    fn ids(items: &[PetRosterItem]) -> Vec<String> {
        items.iter().map(|i| i.id.clone()).collect()
    }

    #[test]
    fn candidates_need_a_pet_name() {
        let posts = vec![
            post("a", Some("Milo"), "Newtown", 8),
            post("b", None, "Newtown", 9),
            post("c", Some("  "), "Newtown", 9),
            post("d", Some("milo"), "newtown ", 10),
        ];
        let candidates = roster_candidates(&posts, Utc.fix());
        assert_eq!(ids(&candidates), vec!["d"]);
        assert_eq!(candidates[0].added_on, day(1));
    }

    #[test]
    fn added_day_follows_the_offset() {
        let posts = vec![post("late", Some("Milo"), "Newtown", 22)];
        let sydney = FixedOffset::east_opt(11 * 3600).unwrap();
        assert_eq!(roster_candidates(&posts, Utc.fix())[0].added_on, day(1));
        assert_eq!(roster_candidates(&posts, sydney)[0].added_on, day(2));
    }

    #[test]
    fn window_excludes_old_and_future_items() {
        let candidates = vec![
            item(1, "Newtown", day(1)),
            item(2, "Newtown", day(7)),
            item(3, "Newtown", day(8)),
            item(4, "Newtown", day(9)),
        ];
        let roster = pet_roster(&candidates, Some("Newtown"), day(8), 7, 8);
        let mut got = ids(&roster);
        got.sort();
        assert_eq!(got, vec!["post_2", "post_3"]);
    }

    #[test]
    fn scope_filters_suburb() {
        let candidates = vec![item(1, "Newtown", day(3)), item(2, "Glebe", day(3))];
        assert_eq!(
            ids(&pet_roster(&candidates, Some("glebe"), day(3), 7, 8)),
            vec!["post_2"]
        );
        assert_eq!(pet_roster(&candidates, None, day(3), 7, 8).len(), 2);
    }

    #[test]
    fn truncates_to_display_count() {
        let candidates: Vec<_> = (0..20).map(|i| item(i, "Newtown", day(5))).collect();
        assert_eq!(pet_roster(&candidates, Some("Newtown"), day(5), 7, 8).len(), 8);
    }

    #[test]
    fn order_changes_across_days() {
        let candidates: Vec<_> = (0..12).map(|i| item(i, "Newtown", day(1))).collect();
        let monday = pet_roster(&candidates, Some("Newtown"), day(2), 7, 12);
        let tuesday = pet_roster(&candidates, Some("Newtown"), day(3), 7, 12);
        assert_eq!(monday.len(), tuesday.len());
        assert_ne!(ids(&monday), ids(&tuesday));
    }

    proptest! {
        #[test]
        fn same_scope_and_day_is_deterministic(
            n in 1usize..30,
            scope in "[A-Za-z]{3,10}",
            d in 1u32..28,
        ) {
            let candidates: Vec<_> = (0..n).map(|i| item(i, &scope, day(d))).collect();
            let first = pet_roster(&candidates, Some(&scope), day(d), 7, 8);
            let second = pet_roster(&candidates, Some(&scope), day(d), 7, 8);
            prop_assert_eq!(first, second);
        }
    }
}
