//! Engine facade.

use crate::buffer::{Committed, MutationBuffer, PendingWrite, ReplayReport};
use crate::chat::ChatSession;
use crate::community::Community;
use crate::config::EngineConfig;
use crate::coordinator::{BookingReceipt, Coordinator, QuoteReceipt};
use crate::error::{EngineError, EngineResult};
use crate::gateway::Gateway;
use crate::snapshot::SnapshotStore;
use crate::store::{AppState, ConnectionMode, StateStore};
use crate::sync::{SyncParams, SyncReport, Synchronizer};
use chrono::NaiveDate;
use mockable::Clock;
use pawsync_model::{
    AvailabilitySlot, Booking, BookingHold, BookingRequest, BookingStatus, ChatReply, ChatRequest,
    ChatTurn, ClientRef, CommunityEvent, CommunityPost, EventDraft, Group, GroupDraft,
    GroupInvite, Notification, OnboardingRequest, OnboardingResult, PostDraft, PostKind, Provider,
    ProviderDraft, ProviderUpdate, QuoteDraft, QuoteResponse, QuoteTarget, SlotKey, UiAction,
};
use pawsync_storage::{BlobStore, InMemoryBlobStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What dispatching a suggested action did.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The action changed the sync parameters and a sync ran.
    Synced(SyncReport),
    /// The action opened a post composer prefilled with this draft.
    ComposePost(PostDraft),
    /// The suggested pet profile was accepted.
    ProfileAccepted {
        /// Pet name from the card.
        pet_name: Option<String>,
    },
    /// A listing drafted in chat was submitted.
    Listing(Committed<Provider>),
    /// A group was joined.
    Joined(Group),
}

/// The client engine.
///
/// `Engine` owns the published state and wires the synchronizer, the
/// coordinator, community operations and chat to one gateway and one cache.
/// Every write that succeeds is followed by a refresh with the parameters of
/// the last sync, so the published state always converges on the server's.
///
/// # Example
///
/// ```rust,ignore
/// use pawsync_engine::{Engine, EngineConfig, Environment, SyncParams};
///
/// let engine = Engine::open(
///     EngineConfig::new(Environment::Prod),
///     gateway,
///     blobs,
///     Arc::new(mockable::DefaultClock),
/// )?;
///
/// let mut states = engine.subscribe();
/// engine.sync(SyncParams::for_user("user_2")).await?;
/// println!("{} threads", states.borrow_and_update().views.threads.len());
/// ```
pub struct Engine {
    config: Arc<EngineConfig>,
    gateway: Arc<dyn Gateway>,
    store: Arc<StateStore>,
    buffer: Arc<MutationBuffer>,
    synchronizer: Synchronizer,
    coordinator: Coordinator,
    community: Community,
    chat: ChatSession,
}

impl Engine {
    /// Opens an engine over a blob store, reloading writes buffered by an
    /// earlier session.
    ///
    /// Unreadable pending writes are logged and dropped; the engine still
    /// opens.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob store fails while reading.
    pub fn open(
        config: EngineConfig,
        gateway: Arc<dyn Gateway>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        let config = Arc::new(config);
        let snapshots = SnapshotStore::new(blobs, Arc::clone(&clock), &config);
        let buffer = Arc::new(MutationBuffer::new(&config, snapshots.clone()));
        match buffer.restore() {
            Ok(_) => {}
            Err(EngineError::Codec(message)) => {
                warn!(error = %message, "discarding unreadable pending writes");
            }
            Err(e) => return Err(e),
        }
        let store = Arc::new(StateStore::new(Arc::clone(&config), clock));

        info!(
            environment = %config.environment,
            mock_data = config.use_mock_data,
            low_trust = config.is_low_trust(),
            pending = buffer.len(),
            "engine opened"
        );
        Ok(Self {
            synchronizer: Synchronizer::new(
                Arc::clone(&gateway),
                snapshots,
                Arc::clone(&buffer),
                Arc::clone(&store),
                Arc::clone(&config),
            ),
            coordinator: Coordinator::new(
                Arc::clone(&gateway),
                Arc::clone(&store),
                Arc::clone(&buffer),
                Arc::clone(&config),
            ),
            community: Community::new(
                Arc::clone(&gateway),
                Arc::clone(&store),
                Arc::clone(&buffer),
            ),
            chat: ChatSession::new(Arc::clone(&gateway), Arc::clone(&store)),
            config,
            gateway,
            store,
            buffer,
        })
    }

    /// Opens an engine with a throwaway in-memory cache.
    pub fn in_memory(
        config: EngineConfig,
        gateway: Arc<dyn Gateway>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        Self::open(config, gateway, Arc::new(InMemoryBlobStore::new()), clock)
    }

    /// The configuration the engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to published states.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.store.subscribe()
    }

    /// Current state.
    pub fn current(&self) -> Arc<AppState> {
        self.store.current()
    }

    /// Recomputes day-dependent views, e.g. after midnight.
    pub fn refresh_views(&self) {
        self.store.refresh_views();
    }

    // ---- sync ----

    /// Loads every collection with `params` and publishes the result.
    pub async fn sync(&self, params: SyncParams) -> EngineResult<SyncReport> {
        self.synchronizer.sync(params).await
    }

    /// Like [`Engine::sync`], after the search debounce. Only the last of
    /// several rapid calls publishes.
    pub async fn sync_debounced(&self, params: SyncParams) -> EngineResult<SyncReport> {
        self.synchronizer.sync_debounced(params).await
    }

    /// Re-runs the last sync.
    pub async fn refresh(&self) -> EngineResult<SyncReport> {
        self.synchronizer.refresh().await
    }

    /// Changes the search text of the last sync, debounced.
    pub async fn search(&self, text: &str) -> EngineResult<SyncReport> {
        let params = self.store.select(|s| s.params.clone()).with_search(text);
        self.sync_debounced(params).await
    }

    async fn refresh_after_write(&self) {
        if self.store.select(|s| s.mode) == ConnectionMode::Unsynced {
            return;
        }
        match self.synchronizer.refresh().await {
            Ok(report) => {
                debug!(token = %report.token, mode = ?report.mode, "refreshed after write")
            }
            Err(e @ (EngineError::Superseded { .. } | EngineError::NoSnapshot { .. })) => {
                debug!(error = %e, "refresh after write skipped");
            }
            Err(e) => warn!(error = %e, "refresh after write failed"),
        }
    }

    // ---- bookings and quotes ----

    /// Places a hold on a slot.
    pub async fn create_hold(&self, slot: &SlotKey, user_id: &str) -> EngineResult<BookingHold> {
        let hold = self.coordinator.create_hold(slot, user_id).await?;
        self.refresh_after_write().await;
        Ok(hold)
    }

    /// Requests a booking.
    pub async fn request_booking(&self, request: BookingRequest) -> EngineResult<BookingReceipt> {
        let receipt = self.coordinator.request_booking(request).await?;
        self.refresh_after_write().await;
        Ok(receipt)
    }

    /// Moves a booking to a new status.
    pub async fn respond_to_booking(
        &self,
        booking_id: &str,
        actor_user_id: &str,
        status: BookingStatus,
        note: &str,
    ) -> EngineResult<Booking> {
        let booking = self
            .coordinator
            .respond_to_booking(booking_id, actor_user_id, status, note)
            .await?;
        self.refresh_after_write().await;
        Ok(booking)
    }

    /// Sends a quote request to every matching provider.
    pub async fn request_quote(&self, draft: QuoteDraft) -> EngineResult<QuoteReceipt> {
        let receipt = self.coordinator.request_quote(draft).await?;
        self.refresh_after_write().await;
        Ok(receipt)
    }

    /// Answers one quote target.
    pub async fn respond_to_quote_target(
        &self,
        target_id: &str,
        response: QuoteResponse,
    ) -> EngineResult<QuoteTarget> {
        let target = self
            .coordinator
            .respond_to_quote_target(target_id, response)
            .await?;
        self.refresh_after_write().await;
        Ok(target)
    }

    /// Slot availability of a provider.
    pub async fn availability(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> EngineResult<Vec<AvailabilitySlot>> {
        self.coordinator.availability(provider_id, date).await
    }

    // ---- listings ----

    /// Creates a listing.
    pub async fn create_listing(&self, draft: ProviderDraft) -> EngineResult<Committed<Provider>> {
        let committed = self.coordinator.create_listing(draft).await?;
        self.refresh_after_write().await;
        Ok(committed)
    }

    /// Updates a listing.
    pub async fn update_listing(
        &self,
        provider_id: &str,
        update: ProviderUpdate,
    ) -> EngineResult<Provider> {
        let provider = self.coordinator.update_listing(provider_id, update).await?;
        self.refresh_after_write().await;
        Ok(provider)
    }

    /// Soft-cancels a listing.
    pub async fn cancel_listing(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<Provider> {
        let provider = self
            .coordinator
            .cancel_listing(provider_id, actor_user_id)
            .await?;
        self.refresh_after_write().await;
        Ok(provider)
    }

    /// Restores a cancelled listing.
    pub async fn restore_listing(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<Provider> {
        let provider = self
            .coordinator
            .restore_listing(provider_id, actor_user_id)
            .await?;
        self.refresh_after_write().await;
        Ok(provider)
    }

    // ---- community ----

    /// Joins a group.
    pub async fn join_group(&self, group_id: &str, user_id: &str) -> EngineResult<Group> {
        let group = self.community.join_group(group_id, user_id).await?;
        self.refresh_after_write().await;
        Ok(group)
    }

    /// Creates a group.
    pub async fn create_group(&self, draft: GroupDraft) -> EngineResult<Committed<Group>> {
        let committed = self.community.create_group(draft).await?;
        self.refresh_after_write().await;
        Ok(committed)
    }

    /// Creates an invite link.
    pub async fn create_invite(
        &self,
        group_id: &str,
        inviter_user_id: &str,
    ) -> EngineResult<GroupInvite> {
        self.community.create_invite(group_id, inviter_user_id).await
    }

    /// Resolves an invite token.
    pub async fn resolve_invite(&self, token: &str) -> EngineResult<GroupInvite> {
        self.community.resolve_invite(token).await
    }

    /// Consumes an invite.
    pub async fn complete_onboarding(
        &self,
        request: OnboardingRequest,
    ) -> EngineResult<OnboardingResult> {
        let result = self.community.complete_onboarding(request).await?;
        self.refresh_after_write().await;
        Ok(result)
    }

    /// Publishes a post.
    pub async fn create_post(&self, draft: PostDraft) -> EngineResult<Committed<CommunityPost>> {
        let committed = self.community.create_post(draft).await?;
        self.refresh_after_write().await;
        Ok(committed)
    }

    /// Creates an event.
    pub async fn create_event(&self, draft: EventDraft) -> EngineResult<Committed<CommunityEvent>> {
        let committed = self.community.create_event(draft).await?;
        self.refresh_after_write().await;
        Ok(committed)
    }

    /// RSVPs to an event.
    pub async fn rsvp_event(&self, event_id: &str, user_id: &str) -> EngineResult<CommunityEvent> {
        let event = self.community.rsvp_event(event_id, user_id).await?;
        self.refresh_after_write().await;
        Ok(event)
    }

    /// Approves an event.
    pub async fn approve_event(
        &self,
        event_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<CommunityEvent> {
        let event = self.community.approve_event(event_id, actor_user_id).await?;
        self.refresh_after_write().await;
        Ok(event)
    }

    /// Fetches notifications.
    pub async fn notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> EngineResult<Vec<Notification>> {
        self.community.notifications(user_id, unread_only).await
    }

    /// Marks a notification read.
    pub async fn mark_notification_read(
        &self,
        notification_id: &str,
    ) -> EngineResult<Notification> {
        self.community.mark_notification_read(notification_id).await
    }

    // ---- chat ----

    /// Puts a conversation on screen.
    pub fn select_conversation(&self, conversation_id: &str) {
        self.chat.select(conversation_id);
    }

    /// Transcript of a conversation.
    pub fn transcript(&self, conversation_id: &str) -> Vec<ChatTurn> {
        self.chat.transcript(conversation_id)
    }

    /// Sends a chat message.
    pub async fn chat(&self, request: ChatRequest) -> EngineResult<ChatReply> {
        self.chat.send(request).await
    }

    /// Sends a chat message and streams the reply into the transcript.
    pub async fn stream_chat(&self, request: ChatRequest) -> EngineResult<ChatReply> {
        self.chat.stream(request).await
    }

    /// Carries out a suggested action on behalf of `user_id`.
    ///
    /// Search-style actions re-sync with the implied category and suburb.
    /// A listing drafted in chat goes through [`Engine::create_listing`], so it
    /// is buffered like any other listing when the write qualifies.
    pub async fn dispatch(&self, action: UiAction, user_id: &str) -> EngineResult<ActionOutcome> {
        let mut base = self.store.select(|s| s.params.clone());
        if base.user_id.is_none() {
            base.user_id = Some(user_id.to_string());
        }
        debug!(?action, user = user_id, "dispatching action");
        let category = action.implied_category();
        match action {
            UiAction::OpenServices { suburb, .. }
            | UiAction::FindDogWalkers { suburb }
            | UiAction::FindGroomers { suburb } => {
                let suburb = suburb.or_else(|| base.suburb.clone());
                let params = base.with_category(category).with_suburb(suburb);
                Ok(ActionOutcome::Synced(self.sync(params).await?))
            }
            UiAction::OpenCommunity { suburb } => {
                let suburb = suburb.or_else(|| base.suburb.clone());
                let params = base.with_suburb(suburb);
                Ok(ActionOutcome::Synced(self.sync(params).await?))
            }
            UiAction::CreateLostFound {
                title,
                suburb,
                pet_name,
            } => {
                let title = title.unwrap_or_else(|| match &pet_name {
                    Some(name) => format!("Lost: {name}"),
                    None => "Lost pet".to_string(),
                });
                Ok(ActionOutcome::ComposePost(PostDraft {
                    user_id: user_id.to_string(),
                    kind: PostKind::LostFound,
                    title,
                    body: String::new(),
                    suburb: suburb.or(base.suburb).unwrap_or_default(),
                    group_id: None,
                    pet_name,
                    photo_url: None,
                    client_ref: ClientRef::new(),
                }))
            }
            UiAction::AcceptProfileCard { pet_name } => {
                Ok(ActionOutcome::ProfileAccepted { pet_name })
            }
            UiAction::SubmitProviderListing {
                name,
                category,
                suburb,
                description,
                price_from,
            } => {
                let category = category
                    .ok_or_else(|| EngineError::ValidationFailed("category is required".into()))?;
                let draft = ProviderDraft {
                    user_id: user_id.to_string(),
                    name: name.unwrap_or_default(),
                    category,
                    suburb: suburb.or(base.suburb).unwrap_or_default(),
                    description: description.unwrap_or_default(),
                    price_from: price_from.unwrap_or_default(),
                    client_ref: ClientRef::new(),
                };
                Ok(ActionOutcome::Listing(self.create_listing(draft).await?))
            }
            UiAction::JoinGroup { group_id } => {
                Ok(ActionOutcome::Joined(self.join_group(&group_id, user_id).await?))
            }
        }
    }

    // ---- buffer ----

    /// Writes held locally until the server confirms them.
    pub fn pending_writes(&self) -> Vec<PendingWrite> {
        self.buffer.pending()
    }

    /// Re-sends buffered writes with their original keys, then refreshes so
    /// accepted writes reconcile.
    pub async fn replay_pending(&self) -> EngineResult<ReplayReport> {
        let report = self.buffer.replay(self.gateway.as_ref()).await;
        info!(
            sent = report.sent,
            remaining = report.remaining,
            dropped = report.dropped,
            "replayed pending writes"
        );
        if report.sent > 0 || report.dropped > 0 {
            self.refresh_after_write().await;
        }
        Ok(report)
    }
}
