//! Message threads derived from overlapping relationship sources.

use chrono::{DateTime, Utc};
use pawsync_model::{HomeSnapshot, MembershipStatus};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Why a thread exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSource {
    /// A booking links the two users.
    Booking,
    /// A quote request reached a listing the other user owns (or vice versa).
    Listing,
    /// The other user administers a group the viewer belongs to.
    GroupAdmin,
    /// The two users exchanged direct messages.
    Direct,
}

/// One conversation between the viewer and a counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageThread {
    /// Order-independent id of the user pair.
    pub id: String,
    /// The other participant.
    pub counterparty_user_id: String,
    /// Display title.
    pub title: String,
    /// Latest direct message, or a source-specific fallback.
    pub last_message: String,
    /// Time of the latest direct message.
    pub last_activity: Option<DateTime<Utc>>,
    /// Unread messages addressed to the viewer from the counterparty.
    pub unread_count: u32,
    /// Sources that contributed, sorted.
    pub sources: Vec<ThreadSource>,
}

/// Deterministic thread id for an unordered pair of users.
pub fn thread_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(lo.as_bytes());
    hasher.update([0u8]);
    hasher.update(hi.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..12].iter().map(|b| format!("{b:02x}")).collect();
    format!("thr_{hex}")
}

struct ThreadSet<'a> {
    viewer: &'a str,
    threads: HashMap<String, MessageThread>,
}

impl<'a> ThreadSet<'a> {
    fn touch(
        &mut self,
        counterparty: &str,
        source: ThreadSource,
        title: impl FnOnce() -> String,
        fallback: impl FnOnce() -> String,
    ) -> Option<&mut MessageThread> {
        if counterparty.is_empty() || counterparty == self.viewer {
            return None;
        }
        let id = thread_id(self.viewer, counterparty);
        let thread = self.threads.entry(id.clone()).or_insert_with(|| MessageThread {
            id,
            counterparty_user_id: counterparty.to_string(),
            title: title(),
            last_message: fallback(),
            last_activity: None,
            unread_count: 0,
            sources: Vec::new(),
        });
        if !thread.sources.contains(&source) {
            thread.sources.push(source);
            thread.sources.sort();
        }
        Some(thread)
    }
}

/// Builds one thread per counterparty of `viewer`, sorted by unread count
/// (descending) then title.
pub fn message_threads(snapshot: &HomeSnapshot, viewer: &str) -> Vec<MessageThread> {
    let mut set = ThreadSet {
        viewer,
        threads: HashMap::new(),
    };

    for booking in snapshot.bookings() {
        let provider = snapshot.provider(&booking.provider_id);
        let provider_owner = provider.and_then(|p| p.owner_user_id.as_deref());
        let (counterparty, title) = if booking.owner_user_id == viewer {
            let Some(owner) = provider_owner else {
                continue;
            };
            let name = provider.map_or(booking.provider_id.as_str(), |p| p.name.as_str());
            (owner, name.to_string())
        } else if provider_owner == Some(viewer) {
            (booking.owner_user_id.as_str(), booking.owner_user_id.clone())
        } else {
            continue;
        };
        set.touch(
            counterparty,
            ThreadSource::Booking,
            || title,
            || {
                format!(
                    "Booking for {} on {} at {}",
                    booking.pet_name, booking.date, booking.time_slot
                )
            },
        );
    }

    for bundle in &snapshot.quotes {
        let request = &bundle.request;
        let fallback = || format!("Quote request: {} in {}", request.category, request.suburb);
        if request.owner_user_id == viewer {
            for target in &bundle.targets {
                let title = snapshot
                    .provider(&target.provider_id)
                    .map_or_else(|| target.provider_id.clone(), |p| p.name.clone());
                set.touch(
                    &target.provider_owner_user_id,
                    ThreadSource::Listing,
                    || title,
                    fallback,
                );
            }
        } else if bundle
            .targets
            .iter()
            .any(|t| t.provider_owner_user_id == viewer)
        {
            set.touch(
                &request.owner_user_id,
                ThreadSource::Listing,
                || request.owner_user_id.clone(),
                fallback,
            );
        }
    }

    for group in &snapshot.groups {
        if group.membership_status == MembershipStatus::None || group.is_admin {
            continue;
        }
        let Some(admin) = group.owner_user_id.as_deref() else {
            continue;
        };
        set.touch(
            admin,
            ThreadSource::GroupAdmin,
            || group.name.clone(),
            || format!("Admin of {}", group.name),
        );
    }

    for message in &snapshot.messages {
        let Some(counterparty) = message.counterparty_of(viewer) else {
            continue;
        };
        let Some(thread) = set.touch(
            counterparty,
            ThreadSource::Direct,
            || counterparty.to_string(),
            String::new,
        ) else {
            continue;
        };
        let newer = thread
            .last_activity
            .map_or(true, |seen| message.sent_at >= seen);
        if newer {
            thread.last_activity = Some(message.sent_at);
            thread.last_message = message.body.clone();
        }
        if message.recipient_user_id == viewer && !message.read {
            thread.unread_count += 1;
        }
    }

    let mut threads: Vec<MessageThread> = set.threads.into_values().collect();
    threads.sort_by(|a, b| {
        b.unread_count
            .cmp(&a.unread_count)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
    threads
}
