//! Optimistic mutation buffer.
//!
//! When a write fails because the backend does not accept the write method,
//! or the client runs against a low-trust tier, the buffer commits it
//! locally instead. Creates get a client-only entity; changes to existing
//! entities (listing edits, status flips, joins, RSVPs, approvals) are
//! applied to the local copy. Either way the result is shown exactly like a
//! confirmed one and flags the state as pending sync.
//!
//! ## Reconciliation
//!
//! Every buffered write carries a [`ClientRef`]. For creates the server
//! echoes it on the entity it creates, so after a successful sync any
//! buffered create whose reference appears in the server collection is
//! dropped. A buffered change is dropped once the server copy of its
//! entity already shows the change. Until then the buffered write wins and
//! is overlaid onto every published snapshot.
//!
//! A later change to the same entity supersedes an earlier buffered one, so
//! the overlay never replays a stale status over a newer one.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gateway::Gateway;
use crate::snapshot::SnapshotStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pawsync_model::{
    BookingStatusUpdate, ClientRef, EventDraft, EventStatus, GroupDraft, HomeSnapshot,
    MembershipStatus, PostDraft, ProviderDraft, ProviderStatus, ProviderUpdate, RsvpStatus,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

/// A write held locally until the server confirms it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingWrite {
    /// A new provider listing.
    Provider(ProviderDraft),
    /// A new group.
    Group(GroupDraft),
    /// A new community post.
    Post {
        /// The draft as submitted.
        draft: PostDraft,
        /// When the post was committed locally.
        recorded_at: DateTime<Utc>,
    },
    /// A new community event.
    Event(EventDraft),
    /// A partial edit of an existing listing.
    ListingUpdate {
        /// Listing being edited.
        provider_id: String,
        /// Fields to change.
        update: ProviderUpdate,
        /// Local identity of the write.
        client_ref: ClientRef,
    },
    /// A listing cancelled or restored by its owner.
    ListingStatus {
        /// Listing being flipped.
        provider_id: String,
        /// Owner making the change.
        actor_user_id: String,
        /// Target status.
        status: ProviderStatus,
        /// Local identity of the write.
        client_ref: ClientRef,
    },
    /// A request to join a group.
    JoinGroup {
        /// Group joined.
        group_id: String,
        /// Joining user.
        user_id: String,
        /// Local identity of the write.
        client_ref: ClientRef,
    },
    /// An RSVP to an event.
    Rsvp {
        /// Event attended.
        event_id: String,
        /// Attending user.
        user_id: String,
        /// Local identity of the write.
        client_ref: ClientRef,
    },
    /// An event approved by a group admin.
    ApproveEvent {
        /// Event approved.
        event_id: String,
        /// Approving admin.
        actor_user_id: String,
        /// Local identity of the write.
        client_ref: ClientRef,
    },
    /// A booking moved to a new status.
    BookingStatus {
        /// Booking changed.
        booking_id: String,
        /// Requested transition.
        update: BookingStatusUpdate,
        /// Local identity of the write.
        client_ref: ClientRef,
    },
}

impl PendingWrite {
    /// Idempotency key of the write.
    pub fn client_ref(&self) -> ClientRef {
        match self {
            PendingWrite::Provider(d) => d.client_ref,
            PendingWrite::Group(d) => d.client_ref,
            PendingWrite::Post { draft, .. } => draft.client_ref,
            PendingWrite::Event(d) => d.client_ref,
            PendingWrite::ListingUpdate { client_ref, .. }
            | PendingWrite::ListingStatus { client_ref, .. }
            | PendingWrite::JoinGroup { client_ref, .. }
            | PendingWrite::Rsvp { client_ref, .. }
            | PendingWrite::ApproveEvent { client_ref, .. }
            | PendingWrite::BookingStatus { client_ref, .. } => *client_ref,
        }
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PendingWrite::Provider(_) => "provider",
            PendingWrite::Group(_) => "group",
            PendingWrite::Post { .. } => "post",
            PendingWrite::Event(_) => "event",
            PendingWrite::ListingUpdate { .. } => "listing_update",
            PendingWrite::ListingStatus { .. } => "listing_status",
            PendingWrite::JoinGroup { .. } => "join_group",
            PendingWrite::Rsvp { .. } => "rsvp",
            PendingWrite::ApproveEvent { .. } => "approve_event",
            PendingWrite::BookingStatus { .. } => "booking_status",
        }
    }

    /// Returns true if this write changes an existing entity rather than
    /// creating one.
    pub fn is_change(&self) -> bool {
        !matches!(
            self,
            PendingWrite::Provider(_)
                | PendingWrite::Group(_)
                | PendingWrite::Post { .. }
                | PendingWrite::Event(_)
        )
    }

    /// Returns true if `earlier` is a change of the same kind to the same
    /// entity, which this write replaces.
    pub fn supersedes(&self, earlier: &PendingWrite) -> bool {
        use PendingWrite::*;
        match (self, earlier) {
            (ListingUpdate { provider_id: a, .. }, ListingUpdate { provider_id: b, .. })
            | (ListingStatus { provider_id: a, .. }, ListingStatus { provider_id: b, .. })
            | (BookingStatus { booking_id: a, .. }, BookingStatus { booking_id: b, .. }) => a == b,
            (JoinGroup { group_id: a, user_id: x, .. }, JoinGroup { group_id: b, user_id: y, .. })
            | (Rsvp { event_id: a, user_id: x, .. }, Rsvp { event_id: b, user_id: y, .. }) => {
                a == b && x == y
            }
            (ApproveEvent { event_id: a, .. }, ApproveEvent { event_id: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Carries fields of a superseded listing edit that this one leaves
    /// unchanged.
    fn absorb(&mut self, earlier: PendingWrite) {
        if let (
            PendingWrite::ListingUpdate { update, .. },
            PendingWrite::ListingUpdate { update: prior, .. },
        ) = (self, earlier)
        {
            update.name = update.name.take().or(prior.name);
            update.suburb = update.suburb.take().or(prior.suburb);
            update.description = update.description.take().or(prior.description);
            update.price_from = update.price_from.or(prior.price_from);
        }
    }

    /// Returns true if `snapshot` already reflects this write.
    pub fn is_present_in(&self, snapshot: &HomeSnapshot) -> bool {
        let key = Some(self.client_ref());
        match self {
            PendingWrite::Provider(_) => snapshot.providers.iter().any(|p| p.client_ref == key),
            PendingWrite::Group(_) => snapshot.groups.iter().any(|g| g.client_ref == key),
            PendingWrite::Post { .. } => snapshot.posts.iter().any(|p| p.client_ref == key),
            PendingWrite::Event(_) => snapshot.events.iter().any(|e| e.client_ref == key),
            PendingWrite::ListingUpdate {
                provider_id,
                update,
                ..
            } => snapshot.provider(provider_id).is_some_and(|p| {
                let mut edited = p.clone();
                update.apply_to(&mut edited);
                edited == *p
            }),
            PendingWrite::ListingStatus {
                provider_id,
                status,
                ..
            } => snapshot
                .provider(provider_id)
                .is_some_and(|p| p.status == *status),
            PendingWrite::JoinGroup { group_id, .. } => snapshot
                .groups
                .iter()
                .any(|g| g.id == *group_id && g.membership_status != MembershipStatus::None),
            PendingWrite::Rsvp { event_id, .. } => snapshot
                .events
                .iter()
                .any(|e| e.id == *event_id && e.rsvp_status == RsvpStatus::Attending),
            PendingWrite::ApproveEvent { event_id, .. } => snapshot
                .events
                .iter()
                .any(|e| e.id == *event_id && e.status == EventStatus::Approved),
            PendingWrite::BookingStatus {
                booking_id, update, ..
            } => snapshot
                .booking(booking_id)
                .is_some_and(|b| b.status == update.status),
        }
    }

    /// Applies the write to `snapshot` unless it is already reflected there.
    /// Changes to entities not in the snapshot are skipped.
    pub fn apply_to(&self, snapshot: &mut HomeSnapshot) {
        if self.is_present_in(snapshot) {
            return;
        }
        match self {
            PendingWrite::Provider(d) => snapshot.providers.push(d.to_local_provider()),
            PendingWrite::Group(d) => snapshot.groups.push(d.to_local_group()),
            PendingWrite::Post { draft, recorded_at } => {
                snapshot.posts.insert(0, draft.to_local_post(*recorded_at))
            }
            PendingWrite::Event(d) => snapshot.events.push(d.to_local_event()),
            PendingWrite::ListingUpdate {
                provider_id,
                update,
                ..
            } => {
                if let Some(p) = snapshot.providers.iter_mut().find(|p| p.id == *provider_id) {
                    update.apply_to(p);
                }
            }
            PendingWrite::ListingStatus {
                provider_id,
                status,
                ..
            } => {
                if let Some(p) = snapshot.providers.iter_mut().find(|p| p.id == *provider_id) {
                    p.status = *status;
                }
            }
            PendingWrite::JoinGroup { group_id, .. } => {
                if let Some(g) = snapshot.groups.iter_mut().find(|g| g.id == *group_id) {
                    if g.official {
                        g.membership_status = MembershipStatus::Member;
                        g.member_count += 1;
                    } else {
                        g.membership_status = MembershipStatus::Pending;
                    }
                }
            }
            PendingWrite::Rsvp { event_id, .. } => {
                if let Some(e) = snapshot.events.iter_mut().find(|e| e.id == *event_id) {
                    e.rsvp_status = RsvpStatus::Attending;
                    e.attendee_count += 1;
                }
            }
            PendingWrite::ApproveEvent { event_id, .. } => {
                if let Some(e) = snapshot.events.iter_mut().find(|e| e.id == *event_id) {
                    e.status = EventStatus::Approved;
                }
            }
            PendingWrite::BookingStatus {
                booking_id, update, ..
            } => {
                for b in snapshot
                    .owner_bookings
                    .iter_mut()
                    .chain(snapshot.provider_bookings.iter_mut())
                    .filter(|b| b.id == *booking_id)
                {
                    b.status = update.status;
                }
            }
        }
    }

    /// Applies the write to a copy of `snapshot` and picks the entity it
    /// touched. `None` when `pick` finds nothing.
    pub fn preview<T>(
        &self,
        snapshot: &HomeSnapshot,
        pick: impl FnOnce(&HomeSnapshot) -> Option<T>,
    ) -> Option<T> {
        let mut copy = snapshot.clone();
        self.apply_to(&mut copy);
        pick(&copy)
    }

    /// Re-sends the write with its original idempotency key.
    async fn send(&self, gateway: &dyn Gateway) -> EngineResult<()> {
        let result = match self {
            PendingWrite::Provider(d) => gateway.create_provider(d).await.map(drop),
            PendingWrite::Group(d) => gateway.create_group(d).await.map(drop),
            PendingWrite::Post { draft, .. } => gateway.create_post(draft).await.map(drop),
            PendingWrite::Event(d) => gateway.create_event(d).await.map(drop),
            PendingWrite::ListingUpdate {
                provider_id,
                update,
                ..
            } => gateway.update_provider(provider_id, update).await.map(drop),
            PendingWrite::ListingStatus {
                provider_id,
                actor_user_id,
                status: ProviderStatus::Cancelled,
                ..
            } => gateway.cancel_provider(provider_id, actor_user_id).await.map(drop),
            PendingWrite::ListingStatus {
                provider_id,
                actor_user_id,
                status: ProviderStatus::Active,
                ..
            } => gateway.restore_provider(provider_id, actor_user_id).await.map(drop),
            PendingWrite::JoinGroup {
                group_id, user_id, ..
            } => gateway.join_group(group_id, user_id).await.map(drop),
            PendingWrite::Rsvp {
                event_id, user_id, ..
            } => gateway.rsvp_event(event_id, user_id).await.map(drop),
            PendingWrite::ApproveEvent {
                event_id,
                actor_user_id,
                ..
            } => gateway.approve_event(event_id, actor_user_id).await.map(drop),
            PendingWrite::BookingStatus {
                booking_id, update, ..
            } => gateway.update_booking_status(booking_id, update).await.map(drop),
        };
        result.map_err(EngineError::from)
    }
}

/// Where a create call ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Committed<T> {
    /// The server accepted the write.
    Remote(T),
    /// The write is held locally and shown as if confirmed.
    Local(T),
}

impl<T> Committed<T> {
    /// Returns the entity regardless of where it was committed.
    pub fn into_inner(self) -> T {
        match self {
            Committed::Remote(v) | Committed::Local(v) => v,
        }
    }

    /// Borrows the entity.
    pub fn entity(&self) -> &T {
        match self {
            Committed::Remote(v) | Committed::Local(v) => v,
        }
    }

    /// Returns true if the write is only held locally.
    pub fn is_local(&self) -> bool {
        matches!(self, Committed::Local(_))
    }
}

/// Outcome of re-sending persisted writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Writes the server accepted.
    pub sent: usize,
    /// Writes still held locally.
    pub remaining: usize,
    /// Writes the server rejected outright. These are discarded.
    pub dropped: usize,
}

/// Holds buffered writes and decides when a failed write falls back.
pub struct MutationBuffer {
    pending: Mutex<Vec<PendingWrite>>,
    snapshots: SnapshotStore,
    use_mock_data: bool,
    low_trust: bool,
}

impl MutationBuffer {
    /// Creates an empty buffer.
    pub fn new(config: &EngineConfig, snapshots: SnapshotStore) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            snapshots,
            use_mock_data: config.use_mock_data,
            low_trust: config.is_low_trust(),
        }
    }

    /// Reloads writes persisted by an earlier session.
    pub fn restore(&self) -> EngineResult<usize> {
        let restored = self.snapshots.load_pending()?;
        let count = restored.len();
        *self.pending.lock() = restored;
        if count > 0 {
            info!(count, "restored pending writes");
        }
        Ok(count)
    }

    /// Returns true if a failed write should be committed locally.
    ///
    /// Unsupported write methods always fall back. On a low-trust tier any
    /// failure other than a user-facing rejection falls back as well.
    pub fn falls_back(&self, err: &EngineError) -> bool {
        match err {
            EngineError::WriteUnsupported(_) => true,
            _ if self.low_trust => !err.is_rejection(),
            _ => false,
        }
    }

    /// Runs a remote create, committing `write` locally when the failure
    /// qualifies. `local` is the entity shown in that case.
    pub async fn submit<T, Fut>(
        &self,
        write: PendingWrite,
        local: T,
        remote: Fut,
    ) -> EngineResult<Committed<T>>
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        if self.use_mock_data {
            self.push(write);
            return Ok(Committed::Local(local));
        }
        match remote.await {
            Ok(entity) => Ok(Committed::Remote(entity)),
            Err(err) if self.falls_back(&err) => {
                info!(
                    kind = write.kind(),
                    client_ref = %write.client_ref(),
                    error = %err,
                    "write committed locally"
                );
                self.push(write);
                Ok(Committed::Local(local))
            }
            Err(err) => Err(err),
        }
    }

    fn push(&self, mut write: PendingWrite) {
        let mut pending = self.pending.lock();
        if pending.iter().any(|w| w.client_ref() == write.client_ref()) {
            return;
        }
        if let Some(pos) = pending.iter().position(|w| write.supersedes(w)) {
            let earlier = pending.remove(pos);
            debug!(kind = earlier.kind(), client_ref = %earlier.client_ref(), "superseded buffered write");
            write.absorb(earlier);
        }
        pending.push(write);
        self.persist(&pending);
    }

    fn persist(&self, pending: &[PendingWrite]) {
        if let Err(e) = self.snapshots.save_pending(pending) {
            warn!(error = %e, "failed to persist pending writes");
        }
    }

    /// Drops writes the server collection now contains. Returns how many
    /// were reconciled.
    pub fn reconcile(&self, server: &HomeSnapshot) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|w| !w.is_present_in(server));
        let reconciled = before - pending.len();
        if reconciled > 0 {
            info!(reconciled, remaining = pending.len(), "reconciled buffered writes");
            self.persist(&pending);
        }
        reconciled
    }

    /// Returns `snapshot` with every buffered entity injected.
    pub fn overlay(&self, mut snapshot: HomeSnapshot) -> HomeSnapshot {
        for write in self.pending.lock().iter() {
            write.apply_to(&mut snapshot);
        }
        snapshot
    }

    /// Re-sends every buffered write. Accepted writes stay buffered until a
    /// sync reconciles them, so the entity never disappears in between.
    /// Writes the server rejects (conflict, authorization, validation) can
    /// never succeed and are discarded.
    pub async fn replay(&self, gateway: &dyn Gateway) -> ReplayReport {
        let writes = self.pending();
        let mut report = ReplayReport::default();
        let mut rejected = Vec::new();
        for write in &writes {
            match write.send(gateway).await {
                Ok(()) => {
                    debug!(kind = write.kind(), client_ref = %write.client_ref(), "replayed write");
                    report.sent += 1;
                }
                Err(e) if e.is_rejection() => {
                    warn!(kind = write.kind(), error = %e, "replay rejected, dropping write");
                    rejected.push(write.client_ref());
                    report.dropped += 1;
                }
                Err(e) => {
                    warn!(kind = write.kind(), error = %e, "replay failed");
                    report.remaining += 1;
                }
            }
        }
        if !rejected.is_empty() {
            let mut pending = self.pending.lock();
            pending.retain(|w| !rejected.contains(&w.client_ref()));
            self.persist(&pending);
        }
        report
    }

    /// Copies the buffered writes.
    pub fn pending(&self) -> Vec<PendingWrite> {
        self.pending.lock().clone()
    }

    /// Number of buffered writes.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
