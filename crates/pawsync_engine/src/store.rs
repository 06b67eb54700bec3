//! The published application state.
//!
//! All state lives in one [`AppState`] value behind a `tokio::sync::watch`
//! channel. Readers subscribe or select; writers go through
//! [`StateStore::mutate`], which copies the current value, applies the
//! change, recomputes derived views if the snapshot, the sync parameters or
//! the calendar day moved, and publishes the new value as a whole. A
//! mutation that leaves the state unchanged publishes nothing.

use crate::config::EngineConfig;
use crate::sync::SyncParams;
use crate::views::{DerivedViews, ViewDay};
use chrono::{DateTime, NaiveDate, Utc};
use mockable::Clock;
use parking_lot::Mutex;
use pawsync_model::{BookingHold, ChatTurn, HomeSnapshot, SlotKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Where the displayed data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionMode {
    /// No sync has completed yet.
    #[default]
    Unsynced,
    /// Data came from the remote service.
    Online,
    /// Data came from the local cache.
    Offline,
}

/// Everything the screens render from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    /// Latest snapshot with buffered entities overlaid.
    pub snapshot: HomeSnapshot,
    /// Source of the snapshot.
    pub mode: ConnectionMode,
    /// Displayed data includes unconfirmed local state.
    pub pending_sync: bool,
    /// Message of the failure behind an offline fallback.
    pub error: Option<String>,
    /// Holds this client created that have not been consumed or pruned.
    pub holds: Vec<BookingHold>,
    /// Parameters of the last applied sync.
    pub params: SyncParams,
    /// Composite views of `snapshot`.
    pub views: DerivedViews,
    /// Chat transcripts by conversation.
    pub transcripts: BTreeMap<String, Vec<ChatTurn>>,
    /// Conversation currently on screen.
    pub active_conversation: Option<String>,
    /// Bumped on every published change.
    pub revision: u64,
}

impl AppState {
    /// Returns true if the displayed data came from the cache.
    pub fn is_offline_mode(&self) -> bool {
        self.mode == ConnectionMode::Offline
    }

    /// Live hold covering `slot`, if any.
    pub fn live_hold(&self, slot: &SlotKey, now: DateTime<Utc>) -> Option<&BookingHold> {
        self.holds.iter().find(|h| h.covers(slot, now))
    }

    /// Drops holds past their expiry.
    pub fn prune_holds(&mut self, now: DateTime<Utc>) {
        self.holds.retain(|h| !h.is_expired(now));
    }
}

/// Single owner of the published [`AppState`].
pub struct StateStore {
    tx: watch::Sender<Arc<AppState>>,
    /// Serializes writers. Holds the day the published views were built for.
    write: Mutex<Option<ViewDay>>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl StateStore {
    /// Creates a store holding the default state.
    pub fn new(config: Arc<EngineConfig>, clock: Arc<dyn Clock>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(AppState::default()));
        Self {
            tx,
            write: Mutex::new(None),
            clock,
            config,
        }
    }

    /// Subscribes to published states.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.tx.subscribe()
    }

    /// Current state.
    pub fn current(&self) -> Arc<AppState> {
        self.tx.borrow().clone()
    }

    /// Reads a projection of the current state.
    pub fn select<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        f(&self.tx.borrow())
    }

    /// Calendar day used for day-dependent views.
    pub fn today(&self) -> NaiveDate {
        self.view_day().date
    }

    /// Day and time zone used for day-dependent views.
    pub fn view_day(&self) -> ViewDay {
        ViewDay::local(self.clock.local())
    }

    /// Current instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Applies `f` to a copy of the state and publishes it if anything changed.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut built_for = self.write.lock();
        let current = self.current();
        let mut next = AppState::clone(&current);
        let out = f(&mut next);
        let day = self.view_day();
        if *built_for != Some(day)
            || next.snapshot != current.snapshot
            || next.params != current.params
        {
            next.views = DerivedViews::build(
                &next.snapshot,
                next.params.user_id.as_deref(),
                next.params.suburb.as_deref(),
                day,
                &self.config,
            );
            *built_for = Some(day);
        }
        next.revision = current.revision;
        if next != *current {
            next.revision += 1;
            self.tx.send_replace(Arc::new(next));
        }
        out
    }

    /// Recomputes derived views, e.g. after the calendar day changed.
    pub fn refresh_views(&self) {
        self.mutate(|_| ());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use pawsync_model::{CommunityPost, PostKind};

    struct FixedClock(Mutex<DateTime<Utc>>);

    impl Clock for FixedClock {
        fn local(&self) -> DateTime<Local> {
            self.utc().with_timezone(&Local)
        }

        fn utc(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    fn store_at(config: EngineConfig, now: DateTime<Utc>) -> (StateStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock(Mutex::new(now)));
        let store = StateStore::new(Arc::new(config), clock.clone());
        (store, clock)
    }

    fn store() -> StateStore {
        let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        store_at(EngineConfig::default(), noon).0
    }

    fn pet_post(pet: &str, created_at: DateTime<Utc>) -> CommunityPost {
        CommunityPost {
            id: format!("post_{}", pet.to_lowercase()),
            kind: PostKind::GroupPost,
            title: "Walk".into(),
            body: String::new(),
            suburb: "Newtown".into(),
            author_user_id: None,
            group_id: None,
            pet_name: Some(pet.into()),
            photo_url: None,
            created_at,
            client_ref: None,
        }
    }

    #[test]
    fn unchanged_mutation_publishes_nothing() {
        let store = store();
        let rx = store.subscribe();
        store.mutate(|s| s.pending_sync = false);
        assert_eq!(store.current().revision, 0);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn change_bumps_revision_and_notifies() {
        let store = store();
        let mut rx = store.subscribe();
        store.mutate(|s| s.error = Some("offline".into()));
        assert_eq!(store.current().revision, 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().error.as_deref(),
            Some("offline")
        );
    }

    #[test]
    fn views_follow_snapshot() {
        let store = store();
        let created_at = store.now();
        store.mutate(|s| s.snapshot.posts.push(pet_post("Milo", created_at)));
        let state = store.current();
        assert_eq!(state.views.roster.len(), 1);
        assert_eq!(state.views.roster[0].pet_name, "Milo");
    }

    #[test]
    fn post_from_just_now_is_on_todays_roster() {
        let late = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 30).unwrap();
        let (store, _) = store_at(EngineConfig::default().with_roster(1, 8), late);
        store.mutate(|s| s.snapshot.posts.push(pet_post("Milo", late)));
        let roster = store.select(|s| s.views.roster.clone());
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].added_on, store.today());
    }

    #[test]
    fn views_rebuild_only_when_their_inputs_move() {
        let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let (store, clock) = store_at(EngineConfig::default(), noon);
        store.mutate(|s| s.snapshot.posts.push(pet_post("Milo", noon)));
        assert_eq!(store.current().views.roster.len(), 1);

        // A transcript-only change leaves the built views alone.
        store.mutate(|s| {
            s.views.roster.clear();
            s.active_conversation = Some("c1".into());
        });
        assert!(store.current().views.roster.is_empty());

        *clock.0.lock() = noon + chrono::Duration::days(1);
        store.mutate(|s| s.active_conversation = Some("c2".into()));
        assert_eq!(store.current().views.roster.len(), 1);
    }

    #[test]
    fn published_states_are_snapshots() {
        let store = store();
        let before = store.current();
        store.mutate(|s| s.pending_sync = true);
        assert!(!before.pending_sync);
        assert!(store.select(|s| s.pending_sync));
    }
}
