//! State synchronizer.
//!
//! A sync fetches every collection the home screens need, concurrently,
//! and publishes the result as one snapshot. Any failed fetch falls back to
//! the cached snapshot, tagged offline with the failure message.
//!
//! ## Supersession
//!
//! Each sync is tagged with a monotonic [`SyncToken`]. Only the most
//! recently issued token may publish; an older request that completes
//! later is discarded with [`EngineError::Superseded`].

use crate::buffer::MutationBuffer;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{Gateway, GatewayResult};
use crate::snapshot::SnapshotStore;
use crate::store::{AppState, ConnectionMode, StateStore};
use chrono::Days;
use pawsync_model::{
    CalendarRole, Category, GeoPoint, HomeSnapshot, ProviderQuery, QuoteBundle, SortBy,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Filters and identity a sync is run with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncParams {
    /// Signed-in user; user-scoped collections are empty without one.
    pub user_id: Option<String>,
    /// Category filter.
    pub category: Option<Category>,
    /// Suburb filter; also the roster scope.
    pub suburb: Option<String>,
    /// Free-text search.
    pub search: Option<String>,
    /// Catalog sort order.
    pub sort_by: SortBy,
    /// Minimum rating.
    pub min_rating: Option<f64>,
    /// Maximum distance from `origin`.
    pub max_distance_km: Option<f64>,
    /// Device location.
    pub origin: Option<GeoPoint>,
    /// Calendar perspective.
    pub calendar_role: CalendarRole,
}

impl SyncParams {
    /// Parameters for a signed-in user with no filters.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Sets the category filter.
    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    /// Sets the suburb filter.
    pub fn with_suburb(mut self, suburb: Option<String>) -> Self {
        self.suburb = suburb;
        self
    }

    /// Sets the search text. Blank text clears it.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = Some(search.trim().to_string()).filter(|s| !s.is_empty());
        self
    }

    /// Sets the sort order.
    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Sets the device location.
    pub fn with_origin(mut self, origin: GeoPoint) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Sets the calendar perspective.
    pub fn with_calendar_role(mut self, role: CalendarRole) -> Self {
        self.calendar_role = role;
        self
    }

    /// Catalog query.
    pub fn catalog_query(&self) -> ProviderQuery {
        ProviderQuery {
            category: self.category,
            suburb: self.suburb.clone(),
            min_rating: self.min_rating,
            max_distance_km: self.max_distance_km,
            origin: self.origin,
            q: self.search.clone(),
            sort_by: self.sort_by,
            include_inactive: false,
            user_id: None,
        }
    }

    /// Query for the user's own listings, cancelled ones included.
    pub fn owned_query(&self) -> Option<ProviderQuery> {
        self.user_id.as_ref().map(|user_id| ProviderQuery {
            include_inactive: true,
            user_id: Some(user_id.clone()),
            ..ProviderQuery::default()
        })
    }
}

/// Tag of one sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncToken(u64);

impl SyncToken {
    /// Raw value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a completed sync published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Token of the request.
    pub token: SyncToken,
    /// Source of the published data.
    pub mode: ConnectionMode,
    /// Whether unconfirmed local state is shown.
    pub pending_sync: bool,
    /// Failure behind an offline fallback.
    pub error: Option<String>,
    /// Buffered writes matched with server entities.
    pub reconciled: usize,
}

/// Runs load cycles and publishes their results.
pub struct Synchronizer {
    gateway: Arc<dyn Gateway>,
    snapshots: SnapshotStore,
    buffer: Arc<MutationBuffer>,
    store: Arc<StateStore>,
    config: Arc<EngineConfig>,
    issued: AtomicU64,
}

impl Synchronizer {
    /// Creates a synchronizer.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        snapshots: SnapshotStore,
        buffer: Arc<MutationBuffer>,
        store: Arc<StateStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            gateway,
            snapshots,
            buffer,
            store,
            config,
            issued: AtomicU64::new(0),
        }
    }

    fn issue(&self) -> SyncToken {
        SyncToken(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns true if `token` is the most recently issued one.
    pub fn is_current(&self, token: SyncToken) -> bool {
        self.issued.load(Ordering::SeqCst) == token.0
    }

    fn ensure_current(&self, token: SyncToken) -> EngineResult<()> {
        if self.is_current(token) {
            Ok(())
        } else {
            debug!(%token, "discarding superseded sync");
            Err(EngineError::Superseded { token: token.0 })
        }
    }

    /// Runs a sync now.
    pub async fn sync(&self, params: SyncParams) -> EngineResult<SyncReport> {
        let token = self.issue();
        self.run(token, params).await
    }

    /// Runs a sync after the search debounce, unless another sync is
    /// requested in the meantime.
    pub async fn sync_debounced(&self, params: SyncParams) -> EngineResult<SyncReport> {
        let token = self.issue();
        tokio::time::sleep(self.config.search_debounce).await;
        self.ensure_current(token)?;
        self.run(token, params).await
    }

    /// Re-runs the last applied sync.
    pub async fn refresh(&self) -> EngineResult<SyncReport> {
        let params = self.store.select(|s| s.params.clone());
        self.sync(params).await
    }

    async fn run(&self, token: SyncToken, params: SyncParams) -> EngineResult<SyncReport> {
        if self.config.use_mock_data {
            return self.serve_cached(token, params, None);
        }
        debug!(%token, user = ?params.user_id, "sync started");
        let fetched = self.fetch_all(&params).await;
        self.ensure_current(token)?;
        match fetched {
            Ok(server) => self.publish_online(token, params, server),
            Err(err) => {
                let err = EngineError::from(err);
                warn!(%token, error = %err, "sync failed, falling back to cache");
                self.serve_cached(token, params, Some(err.to_string()))
            }
        }
    }

    fn publish_online(
        &self,
        token: SyncToken,
        params: SyncParams,
        server: HomeSnapshot,
    ) -> EngineResult<SyncReport> {
        if let Err(e) = self.snapshots.save(&server) {
            warn!(error = %e, "failed to cache snapshot");
        }
        let reconciled = self.buffer.reconcile(&server);
        let merged = self.buffer.overlay(server);
        let pending_sync = !self.buffer.is_empty();
        let now = self.store.now();
        let published = self.store.mutate(|state| {
            if !self.is_current(token) {
                return false;
            }
            let mut merged = merged;
            keep_reminders(&mut merged.quotes, &state.snapshot.quotes);
            state.snapshot = merged;
            state.mode = ConnectionMode::Online;
            state.pending_sync = pending_sync;
            state.error = None;
            state.params = params;
            state.prune_holds(now);
            drop_consumed_holds(state);
            true
        });
        if !published {
            debug!(%token, "discarding superseded sync");
            return Err(EngineError::Superseded { token: token.0 });
        }
        info!(%token, reconciled, pending_sync, "sync complete");
        Ok(SyncReport {
            token,
            mode: ConnectionMode::Online,
            pending_sync,
            error: None,
            reconciled,
        })
    }

    fn serve_cached(
        &self,
        token: SyncToken,
        params: SyncParams,
        error: Option<String>,
    ) -> EngineResult<SyncReport> {
        let cached = match self.snapshots.load() {
            Ok(Some(cached)) => Some(cached.snapshot),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "cached snapshot unreadable");
                None
            }
        };
        let snapshot = match (cached, &error) {
            (Some(snapshot), _) => snapshot,
            (None, None) => HomeSnapshot::default(),
            (None, Some(cause)) => {
                return Err(EngineError::NoSnapshot {
                    cause: cause.clone(),
                })
            }
        };
        let merged = self.buffer.overlay(snapshot);
        let pending_sync = error.is_some() || !self.buffer.is_empty();
        let now = self.store.now();
        let published_error = error.clone();
        let published = self.store.mutate(|state| {
            if !self.is_current(token) {
                return false;
            }
            let mut merged = merged;
            keep_reminders(&mut merged.quotes, &state.snapshot.quotes);
            state.snapshot = merged;
            state.mode = ConnectionMode::Offline;
            state.pending_sync = pending_sync;
            state.error = published_error;
            state.params = params;
            state.prune_holds(now);
            true
        });
        if !published {
            debug!(%token, "discarding superseded sync");
            return Err(EngineError::Superseded { token: token.0 });
        }
        info!(%token, pending_sync, "serving cached snapshot");
        Ok(SyncReport {
            token,
            mode: ConnectionMode::Offline,
            pending_sync,
            error,
            reconciled: 0,
        })
    }

    async fn fetch_all(&self, params: &SyncParams) -> GatewayResult<HomeSnapshot> {
        let gw = self.gateway.as_ref();
        let user = params.user_id.as_deref();
        let suburb = params.suburb.as_deref();
        let catalog_query = params.catalog_query();
        let owned_query = params.owned_query();
        let today = self.store.today();
        let horizon = today
            .checked_add_days(Days::new(u64::from(self.config.calendar_horizon_days)))
            .unwrap_or(today);

        let (catalog, owned, groups, posts, events) = tokio::try_join!(
            gw.list_providers(&catalog_query),
            async {
                match &owned_query {
                    Some(query) => gw.list_providers(query).await,
                    None => Ok(Vec::new()),
                }
            },
            async {
                match user {
                    Some(u) => gw.list_groups(u).await,
                    None => Ok(Vec::new()),
                }
            },
            gw.list_posts(suburb),
            gw.list_events(user, suburb),
        )?;

        let (owner_bookings, provider_bookings, calendar, quotes, messages, notifications) =
            match user {
                Some(u) => tokio::try_join!(
                    gw.list_bookings(u, CalendarRole::Owner),
                    gw.list_bookings(u, CalendarRole::Provider),
                    gw.calendar_events(u, params.calendar_role, today, horizon),
                    gw.list_quotes(u),
                    gw.list_messages(u),
                    gw.list_notifications(u, false),
                )?,
                None => Default::default(),
            };

        let mut snapshot = HomeSnapshot {
            providers: catalog,
            groups,
            posts,
            events,
            owner_bookings,
            provider_bookings,
            calendar,
            quotes,
            messages,
            notifications,
        };
        for provider in owned {
            snapshot.upsert_provider(provider);
        }
        Ok(snapshot)
    }
}

/// Reminder flags never go from true back to false, whatever a response says.
fn keep_reminders(quotes: &mut [QuoteBundle], earlier: &[QuoteBundle]) {
    for bundle in quotes.iter_mut() {
        let Some(previous) = earlier.iter().find(|b| b.request.id == bundle.request.id) else {
            continue;
        };
        for target in bundle.targets.iter_mut() {
            if let Some(seen) = previous.target(&target.id) {
                target.absorb_reminders(seen);
            }
        }
    }
}

/// Holds whose slot the viewer has since booked are no longer needed.
fn drop_consumed_holds(state: &mut AppState) {
    let snapshot = &state.snapshot;
    state.holds.retain(|hold| {
        !snapshot
            .owner_bookings
            .iter()
            .any(|b| b.owner_user_id == hold.owner_user_id && b.occupies(&hold.slot_key()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pawsync_model::{QuoteRequest, QuoteRequestStatus, QuoteTarget, QuoteTargetStatus};

    fn bundle(r15: bool, r60: bool) -> QuoteBundle {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        QuoteBundle {
            request: QuoteRequest {
                id: "q1".into(),
                owner_user_id: "user_2".into(),
                category: Category::Grooming,
                suburb: "Newtown".into(),
                preferred_window: "Weekend".into(),
                pet_details: "Beagle".into(),
                note: String::new(),
                status: QuoteRequestStatus::Pending,
                created_at: at,
            },
            targets: vec![QuoteTarget {
                id: "t1".into(),
                quote_request_id: "q1".into(),
                provider_id: "p2".into(),
                provider_owner_user_id: "user_4".into(),
                status: QuoteTargetStatus::Pending,
                response_message: String::new(),
                created_at: at,
                responded_at: None,
                reminder_15_sent: r15,
                reminder_60_sent: r60,
            }],
        }
    }

    #[test]
    fn reminders_stay_set() {
        let mut fresh = vec![bundle(false, false)];
        keep_reminders(&mut fresh, &[bundle(true, false)]);
        assert!(fresh[0].targets[0].reminder_15_sent);
        assert!(!fresh[0].targets[0].reminder_60_sent);
    }

    #[test]
    fn params_queries() {
        let params = SyncParams::for_user("user_2")
            .with_category(Some(Category::DogWalking))
            .with_suburb(Some("Newtown".into()))
            .with_search("  beagle ");
        let catalog = params.catalog_query();
        assert_eq!(catalog.q.as_deref(), Some("beagle"));
        assert!(catalog.user_id.is_none());
        let owned = params.owned_query().unwrap();
        assert!(owned.include_inactive);
        assert_eq!(owned.user_id.as_deref(), Some("user_2"));
        assert!(SyncParams::default().owned_query().is_none());
        assert!(SyncParams::default().with_search("   ").search.is_none());
    }

    #[test]
    fn token_display() {
        assert_eq!(SyncToken(7).to_string(), "#7");
    }
}
