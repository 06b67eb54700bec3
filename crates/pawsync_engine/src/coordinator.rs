//! Booking and quote coordination.
//!
//! The coordinator runs the write side of the marketplace: holds, bookings
//! and their status changes, quote requests and their per-provider answers,
//! and the viewer's own listings. Every operation checks what it can against
//! the published state before touching the network, then folds the remote
//! result back into the state.
//!
//! Holds are advisory. The remote side makes the authoritative conflict
//! check when the booking is created.

use crate::buffer::{Committed, MutationBuffer, PendingWrite};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gateway::Gateway;
use crate::store::{AppState, StateStore};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use pawsync_model::{
    ActorRole, AvailabilitySlot, Booking, BookingHold, BookingRequest, BookingStatus,
    BookingStatusUpdate, ClientRef, HoldRequest, HomeSnapshot, Provider, ProviderDraft,
    ProviderStatus, ProviderUpdate, QuoteBundle, QuoteDraft, QuoteResponse, QuoteTarget,
    QuoteTargetStatus, SlotBlockReason, SlotKey,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A booking request the remote side accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingReceipt {
    /// The new booking, in `requested`.
    pub booking: Booking,
    /// User that must act next when it is not the requester, typically the
    /// provider owner who confirms. Display copy only.
    pub switch_account_hint: Option<String>,
}

/// A quote request and the providers it reached.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteReceipt {
    /// Request with one target per matched provider.
    pub bundle: QuoteBundle,
    /// Number of providers the request was sent to.
    pub target_count: usize,
}

/// Coordinates holds, bookings, quotes and listings.
pub struct Coordinator {
    gateway: Arc<dyn Gateway>,
    store: Arc<StateStore>,
    buffer: Arc<MutationBuffer>,
    config: Arc<EngineConfig>,
}

impl Coordinator {
    /// Creates a coordinator.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: Arc<StateStore>,
        buffer: Arc<MutationBuffer>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            gateway,
            store,
            buffer,
            config,
        }
    }

    /// Places a hold on `slot` for `user_id`.
    ///
    /// Fails with [`EngineError::SlotUnavailable`] when an active booking
    /// occupies the slot or any live hold covers it, the caller's own
    /// included. A hold is placed once; [`Coordinator::request_booking`]
    /// consumes it.
    pub async fn create_hold(&self, slot: &SlotKey, user_id: &str) -> EngineResult<BookingHold> {
        require_user(user_id)?;
        self.check_slot(slot)?;

        let mut hold = self
            .gateway
            .create_hold(&HoldRequest::new(slot, user_id))
            .await
            .map_err(EngineError::from)?;
        hold.expires_at = hold.expires_at.min(self.store.now() + self.hold_ttl());

        let recorded = hold.clone();
        self.store.mutate(|state| {
            let key = recorded.slot_key();
            state
                .holds
                .retain(|h| !(h.owner_user_id == recorded.owner_user_id && h.slot_key() == key));
            state.holds.push(recorded);
        });
        info!(slot = %slot, user = user_id, hold = %hold.id, "hold placed");
        Ok(hold)
    }

    /// Prunes expired holds, then rejects `slot` if it is booked or held.
    fn check_slot(&self, slot: &SlotKey) -> EngineResult<()> {
        let now = self.store.now();
        self.store.mutate(|state| {
            state.prune_holds(now);
            if state.snapshot.bookings().any(|b| b.occupies(slot)) {
                warn!(slot = %slot, "slot already booked");
                return Err(EngineError::SlotUnavailable(format!("{slot} is booked")));
            }
            match state.live_hold(slot, now) {
                Some(hold) => {
                    warn!(slot = %slot, holder = %hold.owner_user_id, "slot already held");
                    Err(EngineError::SlotUnavailable(format!("{slot} is held")))
                }
                None => Ok(()),
            }
        })
    }

    /// The live hold `user_id` has on `slot`, if any.
    fn own_hold(&self, slot: &SlotKey, user_id: &str) -> Option<BookingHold> {
        let now = self.store.now();
        self.store.select(|state| {
            state
                .live_hold(slot, now)
                .filter(|h| h.owner_user_id == user_id)
                .cloned()
        })
    }

    fn hold_ttl(&self) -> Duration {
        Duration::from_std(self.config.hold_ttl).unwrap_or_else(|_| Duration::minutes(15))
    }

    /// Requests a booking, placing a hold first when the requester does not
    /// already have one.
    pub async fn request_booking(&self, request: BookingRequest) -> EngineResult<BookingReceipt> {
        request.validate()?;
        let slot = SlotKey::new(&request.provider_id, request.date, &request.time_slot)?;
        match self.own_hold(&slot, &request.user_id) {
            Some(hold) => debug!(slot = %slot, hold = %hold.id, "booking against own hold"),
            None => {
                self.create_hold(&slot, &request.user_id).await?;
            }
        }

        let booking = self
            .gateway
            .create_booking(&request)
            .await
            .map_err(EngineError::from)?;

        let stored = booking.clone();
        let user_id = request.user_id.clone();
        let switch_account_hint = self.store.mutate(|state| {
            state
                .holds
                .retain(|h| !(h.owner_user_id == user_id && h.slot_key() == slot));
            if !state.snapshot.replace_booking(&stored) {
                state.snapshot.owner_bookings.push(stored);
            }
            switch_account_hint(&state.snapshot, &request.provider_id, &user_id)
        });
        info!(booking = %booking.id, provider = %booking.provider_id, "booking requested");
        Ok(BookingReceipt {
            booking,
            switch_account_hint,
        })
    }

    /// Moves a booking to `status` on behalf of `actor_user_id`.
    ///
    /// The edge must be legal ([`EngineError::InvalidTransition`]) and the
    /// actor must be on the side that owns the new status
    /// ([`EngineError::NotAuthorized`]). Both are checked before any network
    /// call.
    pub async fn respond_to_booking(
        &self,
        booking_id: &str,
        actor_user_id: &str,
        status: BookingStatus,
        note: impl Into<String>,
    ) -> EngineResult<Booking> {
        require_user(actor_user_id)?;
        let (booking, provider) = self.store.select(|state| {
            let booking = state.snapshot.booking(booking_id).cloned();
            let provider = booking
                .as_ref()
                .and_then(|b| state.snapshot.provider(&b.provider_id).cloned());
            (booking, provider)
        });
        let booking =
            booking.ok_or_else(|| EngineError::NotFound(format!("booking {booking_id}")))?;
        check_booking_actor(&booking, provider.as_ref(), actor_user_id, status)?;

        let update = BookingStatusUpdate {
            actor_user_id: actor_user_id.to_string(),
            status,
            note: note.into(),
        };
        let write = PendingWrite::BookingStatus {
            booking_id: booking_id.to_string(),
            update: update.clone(),
            client_ref: ClientRef::new(),
        };
        let local = self
            .preview(&write, |snapshot| snapshot.booking(booking_id).cloned())
            .ok_or_else(|| EngineError::NotFound(format!("booking {booking_id}")))?;
        let committed = self
            .buffer
            .submit(write.clone(), local, async {
                self.gateway
                    .update_booking_status(booking_id, &update)
                    .await
                    .map_err(EngineError::from)
            })
            .await?;
        self.commit(&write, &committed, |snapshot, booking| {
            snapshot.replace_booking(&booking);
        });
        let updated = committed.into_inner();
        info!(
            booking = booking_id,
            from = %booking.status,
            to = %updated.status,
            "booking updated"
        );
        Ok(updated)
    }

    /// Sends a quote request to every matching provider.
    pub async fn request_quote(&self, draft: QuoteDraft) -> EngineResult<QuoteReceipt> {
        draft.validate()?;
        let bundle = self
            .gateway
            .create_quote(&draft)
            .await
            .map_err(EngineError::from)?;
        let target_count = bundle.targets.len();

        let stored = bundle.clone();
        self.store.mutate(|state| state.snapshot.upsert_quote(stored));
        info!(quote = %bundle.request.id, target_count, "quote request sent");
        Ok(QuoteReceipt {
            bundle,
            target_count,
        })
    }

    /// Answers one quote target. Sibling targets are never touched.
    pub async fn respond_to_quote_target(
        &self,
        target_id: &str,
        response: QuoteResponse,
    ) -> EngineResult<QuoteTarget> {
        let target = self
            .store
            .select(|state| {
                state
                    .snapshot
                    .quotes
                    .iter()
                    .find_map(|bundle| bundle.target(target_id).cloned())
            })
            .ok_or_else(|| EngineError::NotFound(format!("quote target {target_id}")))?;
        if target.provider_owner_user_id != response.actor_user_id {
            return Err(EngineError::NotAuthorized(format!(
                "{} does not own provider {}",
                response.actor_user_id, target.provider_id
            )));
        }
        if target.is_answered() {
            return Err(EngineError::InvalidTransition {
                from: target_status_name(target.status).to_string(),
                to: target_status_name(response.decision.into()).to_string(),
            });
        }

        let updated = self
            .gateway
            .respond_quote_target(target_id, &response)
            .await
            .map_err(EngineError::from)?;

        let stored = updated.clone();
        self.store.mutate(|state| {
            if let Some(bundle) = state
                .snapshot
                .quotes
                .iter_mut()
                .find(|b| b.request.id == stored.quote_request_id)
            {
                bundle.replace_target(stored);
            }
        });
        info!(
            target = target_id,
            status = target_status_name(updated.status),
            "quote target answered"
        );
        Ok(updated)
    }

    /// Creates a listing. Falls back to a buffered listing when the write
    /// qualifies.
    pub async fn create_listing(&self, draft: ProviderDraft) -> EngineResult<Committed<Provider>> {
        draft.validate()?;
        let local = draft.to_local_provider();
        let write = PendingWrite::Provider(draft.clone());
        let committed = self
            .buffer
            .submit(write.clone(), local, async {
                self.gateway
                    .create_provider(&draft)
                    .await
                    .map_err(EngineError::from)
            })
            .await?;
        self.commit(&write, &committed, HomeSnapshot::upsert_provider);
        Ok(committed)
    }

    /// Applies a partial update to a listing the actor owns.
    pub async fn update_listing(
        &self,
        provider_id: &str,
        update: ProviderUpdate,
    ) -> EngineResult<Provider> {
        self.check_owner(provider_id, &update.actor_user_id)?;
        let write = PendingWrite::ListingUpdate {
            provider_id: provider_id.to_string(),
            update: update.clone(),
            client_ref: ClientRef::new(),
        };
        self.change_listing(write, provider_id, async {
            self.gateway
                .update_provider(provider_id, &update)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    /// Soft-cancels a listing. The remote side cancels its active bookings.
    pub async fn cancel_listing(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<Provider> {
        self.check_owner(provider_id, actor_user_id)?;
        let write = listing_status(provider_id, actor_user_id, ProviderStatus::Cancelled);
        let provider = self
            .change_listing(write, provider_id, async {
                self.gateway
                    .cancel_provider(provider_id, actor_user_id)
                    .await
                    .map_err(EngineError::from)
            })
            .await?;
        info!(provider = provider_id, "listing cancelled");
        Ok(provider)
    }

    /// Restores a cancelled listing.
    pub async fn restore_listing(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<Provider> {
        self.check_owner(provider_id, actor_user_id)?;
        let write = listing_status(provider_id, actor_user_id, ProviderStatus::Active);
        let provider = self
            .change_listing(write, provider_id, async {
                self.gateway
                    .restore_provider(provider_id, actor_user_id)
                    .await
                    .map_err(EngineError::from)
            })
            .await?;
        info!(provider = provider_id, "listing restored");
        Ok(provider)
    }

    async fn change_listing(
        &self,
        write: PendingWrite,
        provider_id: &str,
        remote: impl Future<Output = EngineResult<Provider>>,
    ) -> EngineResult<Provider> {
        let local = self
            .preview(&write, |snapshot| snapshot.provider(provider_id).cloned())
            .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;
        let committed = self.buffer.submit(write.clone(), local, remote).await?;
        self.commit(&write, &committed, HomeSnapshot::upsert_provider);
        Ok(committed.into_inner())
    }

    /// The entity `write` touches, as it looks with the write applied.
    fn preview<T>(
        &self,
        write: &PendingWrite,
        pick: impl FnOnce(&HomeSnapshot) -> Option<T>,
    ) -> Option<T> {
        self.store.select(|state| write.preview(&state.snapshot, pick))
    }

    /// Folds a committed write into the published snapshot. A local commit
    /// goes through the buffered write so it looks the same as after every
    /// later overlay.
    fn commit<T: Clone>(
        &self,
        write: &PendingWrite,
        committed: &Committed<T>,
        fold: impl FnOnce(&mut HomeSnapshot, T),
    ) {
        let entity = committed.entity().clone();
        let is_local = committed.is_local();
        self.store.mutate(|state| {
            if is_local {
                write.apply_to(&mut state.snapshot);
                state.pending_sync = true;
            } else {
                fold(&mut state.snapshot, entity);
            }
        });
    }

    fn check_owner(&self, provider_id: &str, actor_user_id: &str) -> EngineResult<()> {
        require_user(actor_user_id)?;
        let provider = self
            .store
            .select(|state| state.snapshot.provider(provider_id).cloned())
            .ok_or_else(|| EngineError::NotFound(format!("provider {provider_id}")))?;
        if provider.is_owned_by(actor_user_id) {
            Ok(())
        } else {
            Err(EngineError::NotAuthorized(format!(
                "{actor_user_id} does not own provider {provider_id}"
            )))
        }
    }

    /// Slots of a provider on `date`, with known bookings and live holds
    /// marked unavailable.
    pub async fn availability(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> EngineResult<Vec<AvailabilitySlot>> {
        let slots = self
            .gateway
            .availability(provider_id, date)
            .await
            .map_err(EngineError::from)?;
        let now = self.store.now();
        Ok(self
            .store
            .select(|state| overlay_availability(slots, provider_id, state, now)))
    }
}

fn listing_status(
    provider_id: &str,
    actor_user_id: &str,
    status: ProviderStatus,
) -> PendingWrite {
    PendingWrite::ListingStatus {
        provider_id: provider_id.to_string(),
        actor_user_id: actor_user_id.to_string(),
        status,
        client_ref: ClientRef::new(),
    }
}

fn require_user(user_id: &str) -> EngineResult<()> {
    if user_id.trim().is_empty() {
        Err(EngineError::ValidationFailed("user_id is required".into()))
    } else {
        Ok(())
    }
}

fn check_booking_actor(
    booking: &Booking,
    provider: Option<&Provider>,
    actor_user_id: &str,
    status: BookingStatus,
) -> EngineResult<()> {
    if !booking.status.can_transition_to(status) {
        return Err(EngineError::booking_transition(booking.status, status));
    }
    let allowed = match status.required_actor() {
        ActorRole::BookingOwner => booking.owner_user_id == actor_user_id,
        // Without the listing in view the remote side decides.
        ActorRole::ProviderOwner => provider.map_or(true, |p| p.is_owned_by(actor_user_id)),
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::NotAuthorized(format!(
            "{actor_user_id} may not set booking {} to {status}",
            booking.id
        )))
    }
}

/// Owner of the booked provider, when that is someone other than `user_id`.
fn switch_account_hint(
    snapshot: &HomeSnapshot,
    provider_id: &str,
    user_id: &str,
) -> Option<String> {
    snapshot
        .provider(provider_id)
        .and_then(|p| p.owner_user_id.clone())
        .filter(|owner| owner != user_id)
}

fn overlay_availability(
    mut slots: Vec<AvailabilitySlot>,
    provider_id: &str,
    state: &AppState,
    now: DateTime<Utc>,
) -> Vec<AvailabilitySlot> {
    for slot in slots.iter_mut().filter(|s| s.available) {
        let key = SlotKey {
            provider_id: provider_id.to_string(),
            date: slot.date,
            time_slot: slot.time_slot.clone(),
        };
        let reason = if state.snapshot.bookings().any(|b| b.occupies(&key)) {
            Some(SlotBlockReason::Booked)
        } else if state.live_hold(&key, now).is_some() {
            Some(SlotBlockReason::Held)
        } else {
            None
        };
        if reason.is_some() {
            slot.available = false;
            slot.reason = reason;
        }
    }
    slots
}

fn target_status_name(status: QuoteTargetStatus) -> &'static str {
    match status {
        QuoteTargetStatus::Pending => "pending",
        QuoteTargetStatus::Accepted => "accepted",
        QuoteTargetStatus::Declined => "declined",
    }
}
