//! In-memory reference backend.
//!
//! [`MemoryGateway`] implements [`Gateway`] with the marketplace's remote
//! semantics: authoritative slot conflicts, the booking state machine, quote
//! fan-out with reminder dispatch, invites with a 48 hour lifetime and
//! idempotent creates keyed by client reference. Failure injection covers
//! the cases the engine has to survive: the network going away, write
//! methods being rejected and slow responses for one suburb.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use mockable::Clock;
use parking_lot::Mutex;
use pawsync_engine::{Gateway, GatewayError, GatewayResult};
use pawsync_model::{
    ActorRole, AvailabilitySlot, Booking, BookingHold, BookingRequest, BookingStatus,
    BookingStatusUpdate, CalendarEvent, CalendarEventKind, CalendarRole, ChatReply, ChatRequest,
    ChatRole, ChatStreamEvent, ChatTurn, CommunityEvent, CommunityPost, DirectMessage, EventDraft,
    EventStatus, Group, GroupDraft, GroupInvite, HoldRequest, MembershipStatus, Notification,
    NotificationCategory, OnboardingRequest, OnboardingResult, PostDraft, PostKind, Provider,
    ProviderDraft, ProviderQuery, ProviderStatus, ProviderUpdate, QuoteBundle, QuoteDraft,
    QuoteRequest, QuoteRequestStatus, QuoteResponse, QuoteTarget, QuoteTargetStatus, RsvpStatus,
    SlotBlockReason, SlotKey, SortBy,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifetime of an invite token.
pub const INVITE_TTL_HOURS: i64 = 48;

/// Bookable start times offered for every provider and date.
pub const DAY_SLOTS: [&str; 8] = [
    "09:00", "10:00", "11:00", "12:00", "13:00", "14:00", "15:00", "16:00",
];

#[derive(Debug, Clone)]
struct GroupRecord {
    group: Group,
    members: BTreeMap<String, MembershipStatus>,
}

impl GroupRecord {
    fn view_for(&self, user_id: Option<&str>) -> Group {
        let mut group = self.group.clone();
        group.member_count = self
            .members
            .values()
            .filter(|m| **m == MembershipStatus::Member)
            .count() as u32;
        group.membership_status = user_id
            .and_then(|u| self.members.get(u).copied())
            .unwrap_or(MembershipStatus::None);
        group.is_admin = user_id.is_some() && group.owner_user_id.as_deref() == user_id;
        group.pending_request_count = if group.is_admin {
            self.members
                .values()
                .filter(|m| **m == MembershipStatus::Pending)
                .count() as u32
        } else {
            0
        };
        group
    }
}

#[derive(Debug, Clone)]
struct EventRecord {
    event: CommunityEvent,
    attendees: BTreeSet<String>,
}

impl EventRecord {
    fn view_for(&self, user_id: Option<&str>) -> CommunityEvent {
        let mut event = self.event.clone();
        event.attendee_count = self.attendees.len() as u32;
        event.rsvp_status = match user_id {
            Some(u) if self.attendees.contains(u) => RsvpStatus::Attending,
            _ => RsvpStatus::None,
        };
        event
    }
}

#[derive(Debug, Default)]
struct World {
    providers: Vec<Provider>,
    bookings: Vec<Booking>,
    holds: Vec<BookingHold>,
    quotes: Vec<QuoteBundle>,
    groups: Vec<GroupRecord>,
    invites: Vec<GroupInvite>,
    posts: Vec<CommunityPost>,
    events: Vec<EventRecord>,
    notifications: Vec<Notification>,
    messages: Vec<DirectMessage>,
    next_id: u64,
}

impl World {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    fn provider(&self, provider_id: &str) -> GatewayResult<&Provider> {
        self.providers
            .iter()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| not_found("provider", provider_id))
    }

    fn provider_mut(&mut self, provider_id: &str) -> GatewayResult<&mut Provider> {
        self.providers
            .iter_mut()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| not_found("provider", provider_id))
    }

    fn owned_provider_mut(
        &mut self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<&mut Provider> {
        let provider = self.provider_mut(provider_id)?;
        if !provider.is_owned_by(actor_user_id) {
            return Err(GatewayError::status(403, "not the listing owner"));
        }
        Ok(provider)
    }

    fn group(&mut self, group_id: &str) -> GatewayResult<&mut GroupRecord> {
        self.groups
            .iter_mut()
            .find(|g| g.group.id == group_id)
            .ok_or_else(|| not_found("group", group_id))
    }

    fn event(&mut self, event_id: &str) -> GatewayResult<&mut EventRecord> {
        self.events
            .iter_mut()
            .find(|e| e.event.id == event_id)
            .ok_or_else(|| not_found("event", event_id))
    }

    fn is_booked(&self, slot: &SlotKey) -> bool {
        self.bookings.iter().any(|b| b.occupies(slot))
    }

    fn live_hold(&self, slot: &SlotKey, now: DateTime<Utc>) -> Option<&BookingHold> {
        self.holds.iter().find(|h| h.covers(slot, now))
    }

    fn notify(&mut self, user_id: &str, title: String, body: String, now: DateTime<Utc>) {
        let id = self.next_id("ntf");
        self.notifications.push(Notification {
            id,
            user_id: user_id.to_string(),
            title,
            body,
            category: NotificationCategory::Booking,
            read: false,
            created_at: now,
            deep_link: None,
        });
    }

    /// Marks reminders due on pending targets. Flags only ever turn on.
    fn dispatch_reminders(&mut self, now: DateTime<Utc>) {
        for bundle in &mut self.quotes {
            for target in bundle.targets.iter_mut().filter(|t| !t.is_answered()) {
                let waited = now - target.created_at;
                if waited >= Duration::minutes(15) {
                    target.reminder_15_sent = true;
                }
                if waited >= Duration::minutes(60) {
                    target.reminder_60_sent = true;
                }
            }
        }
    }
}

fn not_found(kind: &str, id: &str) -> GatewayError {
    GatewayError::status(404, format!("{kind} {id} not found"))
}

fn invalid(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::status(422, err.to_string())
}

fn same_suburb(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// In-memory marketplace backend.
pub struct MemoryGateway {
    world: Mutex<World>,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
    offline: AtomicBool,
    rejected_writes: Mutex<Option<u16>>,
    slow_suburbs: Mutex<HashMap<String, std::time::Duration>>,
    chat_reply: Mutex<Option<ChatReply>>,
    calls: AtomicUsize,
}

impl MemoryGateway {
    /// Creates an empty backend reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            world: Mutex::new(World::default()),
            clock,
            hold_ttl: Duration::minutes(15),
            offline: AtomicBool::new(false),
            rejected_writes: Mutex::new(None),
            slow_suburbs: Mutex::new(HashMap::new()),
            chat_reply: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sets how long holds last.
    pub fn with_hold_ttl(mut self, ttl: Duration) -> Self {
        self.hold_ttl = ttl;
        self
    }

    // ---- failure injection ----

    /// Makes every call fail with a network error until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Rejects every write call with `status` (e.g. 405) until reset.
    /// Holds, booking requests, quotes and onboarding are not affected.
    pub fn reject_writes(&self, status: Option<u16>) {
        *self.rejected_writes.lock() = status;
    }

    /// Delays provider listings filtered to `suburb`.
    pub fn delay_suburb(&self, suburb: &str, delay: std::time::Duration) {
        self.slow_suburbs
            .lock()
            .insert(suburb.trim().to_lowercase(), delay);
    }

    /// Scripts the next chat replies. Without a script the backend echoes.
    pub fn set_chat_reply(&self, reply: ChatReply) {
        *self.chat_reply.lock() = Some(reply);
    }

    /// Number of calls received, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> GatewayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn enter_write(&self) -> GatewayResult<()> {
        self.enter()?;
        match *self.rejected_writes.lock() {
            Some(status) => Err(GatewayError::status(status, "method not allowed")),
            None => Ok(()),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    // ---- seeding and inspection ----

    /// Adds or replaces a provider.
    pub fn add_provider(&self, provider: Provider) {
        let mut world = self.world.lock();
        world.providers.retain(|p| p.id != provider.id);
        world.providers.push(provider);
    }

    /// Adds a booking as-is.
    pub fn add_booking(&self, booking: Booking) {
        self.world.lock().bookings.push(booking);
    }

    /// Adds a group with its member roster.
    pub fn add_group(&self, group: Group, members: &[(&str, MembershipStatus)]) {
        let members = members
            .iter()
            .map(|(u, m)| (u.to_string(), *m))
            .collect();
        self.world.lock().groups.push(GroupRecord { group, members });
    }

    /// Adds a post.
    pub fn add_post(&self, post: CommunityPost) {
        self.world.lock().posts.push(post);
    }

    /// Adds an event.
    pub fn add_event(&self, event: CommunityEvent) {
        self.world.lock().events.push(EventRecord {
            event,
            attendees: BTreeSet::new(),
        });
    }

    /// Adds an invite as-is, e.g. one that has already expired.
    pub fn add_invite(&self, invite: GroupInvite) {
        self.world.lock().invites.push(invite);
    }

    /// Adds a direct message.
    pub fn add_message(&self, message: DirectMessage) {
        self.world.lock().messages.push(message);
    }

    /// Adds a notification.
    pub fn add_notification(&self, notification: Notification) {
        self.world.lock().notifications.push(notification);
    }

    /// All providers, cancelled ones included.
    pub fn providers(&self) -> Vec<Provider> {
        self.world.lock().providers.clone()
    }

    /// All bookings.
    pub fn bookings(&self) -> Vec<Booking> {
        self.world.lock().bookings.clone()
    }

    /// All quote bundles.
    pub fn quotes(&self) -> Vec<QuoteBundle> {
        self.world.lock().quotes.clone()
    }

    /// All posts, newest first.
    pub fn posts(&self) -> Vec<CommunityPost> {
        self.world.lock().posts.clone()
    }

    /// Groups as seen by `user_id`.
    pub fn groups_for(&self, user_id: &str) -> Vec<Group> {
        let world = self.world.lock();
        world.groups.iter().map(|g| g.view_for(Some(user_id))).collect()
    }

    fn chat_answer(&self, request: &ChatRequest) -> ChatReply {
        let mut reply = self.chat_reply.lock().clone().unwrap_or_else(|| ChatReply {
            answer: format!("You said: {}", request.message.trim()),
            cta_chips: Vec::new(),
            conversation: Vec::new(),
        });
        reply.conversation = vec![
            ChatTurn {
                role: ChatRole::User,
                content: request.message.clone(),
            },
            ChatTurn {
                role: ChatRole::Assistant,
                content: reply.answer.clone(),
            },
        ];
        reply
    }
}

fn sort_providers(providers: &mut [Provider], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance => providers.sort_by(|a, b| a.id.cmp(&b.id)),
        SortBy::Rating => providers.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| a.id.cmp(&b.id))
        }),
        SortBy::Price => {
            providers.sort_by(|a, b| a.price_from.cmp(&b.price_from).then_with(|| a.id.cmp(&b.id)))
        }
        SortBy::Distance => providers.sort_by(|a, b| {
            let da = a.distance_km.unwrap_or(f64::MAX);
            let db = b.distance_km.unwrap_or(f64::MAX);
            da.total_cmp(&db).then_with(|| a.id.cmp(&b.id))
        }),
    }
}

fn matches_query(provider: &Provider, query: &ProviderQuery) -> bool {
    if !query.include_inactive && !provider.is_active() {
        return false;
    }
    if let Some(user_id) = &query.user_id {
        if !provider.is_owned_by(user_id) {
            return false;
        }
    }
    if query.category.is_some_and(|c| c != provider.category) {
        return false;
    }
    if let Some(suburb) = &query.suburb {
        if !same_suburb(suburb, &provider.suburb) {
            return false;
        }
    }
    if query.min_rating.is_some_and(|r| provider.rating < r) {
        return false;
    }
    if let (Some(max), Some(distance)) = (query.max_distance_km, provider.distance_km) {
        if distance > max {
            return false;
        }
    }
    if let Some(q) = &query.q {
        let q = q.to_lowercase();
        if !provider.name.to_lowercase().contains(&q)
            && !provider.description.to_lowercase().contains(&q)
        {
            return false;
        }
    }
    true
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list_providers(&self, query: &ProviderQuery) -> GatewayResult<Vec<Provider>> {
        self.enter()?;
        let delay = query
            .suburb
            .as_ref()
            .and_then(|s| self.slow_suburbs.lock().get(&s.trim().to_lowercase()).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut providers: Vec<Provider> = self
            .world
            .lock()
            .providers
            .iter()
            .filter(|p| matches_query(p, query))
            .cloned()
            .collect();
        sort_providers(&mut providers, query.sort_by);
        Ok(providers)
    }

    async fn create_provider(&self, draft: &ProviderDraft) -> GatewayResult<Provider> {
        self.enter_write()?;
        draft.validate().map_err(invalid)?;
        let mut world = self.world.lock();
        if let Some(existing) = world
            .providers
            .iter()
            .find(|p| p.client_ref == Some(draft.client_ref))
        {
            return Ok(existing.clone());
        }
        let mut provider = draft.to_local_provider();
        provider.id = world.next_id("prov");
        world.providers.push(provider.clone());
        Ok(provider)
    }

    async fn update_provider(
        &self,
        provider_id: &str,
        update: &ProviderUpdate,
    ) -> GatewayResult<Provider> {
        self.enter_write()?;
        let mut world = self.world.lock();
        let provider = world.owned_provider_mut(provider_id, &update.actor_user_id)?;
        update.apply_to(provider);
        Ok(provider.clone())
    }

    async fn cancel_provider(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<Provider> {
        self.enter_write()?;
        let now = self.now();
        let mut world = self.world.lock();
        let provider = world.owned_provider_mut(provider_id, actor_user_id)?;
        provider.status = ProviderStatus::Cancelled;
        let provider = provider.clone();

        let mut affected = Vec::new();
        for booking in world
            .bookings
            .iter_mut()
            .filter(|b| b.provider_id == provider_id && b.status.occupies_slot())
        {
            booking.status = BookingStatus::CancelledByProvider;
            affected.push(booking.owner_user_id.clone());
        }
        for owner in affected {
            world.notify(
                &owner,
                "Booking cancelled".into(),
                format!("{} is no longer taking bookings", provider.name),
                now,
            );
        }
        Ok(provider)
    }

    async fn restore_provider(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<Provider> {
        self.enter_write()?;
        let mut world = self.world.lock();
        let provider = world.owned_provider_mut(provider_id, actor_user_id)?;
        provider.status = ProviderStatus::Active;
        Ok(provider.clone())
    }

    async fn availability(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> GatewayResult<Vec<AvailabilitySlot>> {
        self.enter()?;
        let now = self.now();
        let world = self.world.lock();
        world.provider(provider_id)?;
        Ok(DAY_SLOTS
            .iter()
            .map(|time| {
                let key = SlotKey {
                    provider_id: provider_id.to_string(),
                    date,
                    time_slot: time.to_string(),
                };
                let reason = if world.is_booked(&key) {
                    Some(SlotBlockReason::Booked)
                } else if world.live_hold(&key, now).is_some() {
                    Some(SlotBlockReason::Held)
                } else {
                    None
                };
                AvailabilitySlot {
                    date,
                    time_slot: time.to_string(),
                    available: reason.is_none(),
                    reason,
                }
            })
            .collect())
    }

    async fn create_hold(&self, request: &HoldRequest) -> GatewayResult<BookingHold> {
        self.enter()?;
        let now = self.now();
        let slot = SlotKey::new(&request.provider_id, request.date, &request.time_slot)
            .map_err(invalid)?;
        let mut world = self.world.lock();
        if !world.provider(&request.provider_id)?.is_active() {
            return Err(GatewayError::status(409, "provider is not taking bookings"));
        }
        world.holds.retain(|h| !h.is_expired(now));
        if world.is_booked(&slot) {
            return Err(GatewayError::status(409, format!("{slot} is booked")));
        }
        if world.live_hold(&slot, now).is_some() {
            return Err(GatewayError::status(409, format!("{slot} is held")));
        }
        let hold = BookingHold {
            id: world.next_id("hold"),
            provider_id: request.provider_id.clone(),
            owner_user_id: request.user_id.clone(),
            date: request.date,
            time_slot: request.time_slot.clone(),
            expires_at: now + self.hold_ttl,
        };
        world.holds.push(hold.clone());
        Ok(hold)
    }

    async fn create_booking(&self, request: &BookingRequest) -> GatewayResult<Booking> {
        self.enter()?;
        request.validate().map_err(invalid)?;
        let now = self.now();
        let slot = request.slot_key();
        let mut world = self.world.lock();
        let provider = world.provider(&request.provider_id)?.clone();
        if !provider.is_active() {
            return Err(GatewayError::status(409, "provider is not taking bookings"));
        }
        if world.is_booked(&slot) {
            return Err(GatewayError::status(409, format!("{slot} is booked")));
        }
        if world
            .live_hold(&slot, now)
            .is_some_and(|h| h.owner_user_id != request.user_id)
        {
            return Err(GatewayError::status(409, format!("{slot} is held")));
        }
        world
            .holds
            .retain(|h| !(h.owner_user_id == request.user_id && h.slot_key() == slot));
        let booking = Booking {
            id: world.next_id("bkg"),
            owner_user_id: request.user_id.clone(),
            provider_id: request.provider_id.clone(),
            pet_name: request.pet_name.trim().to_string(),
            date: request.date,
            time_slot: request.time_slot.clone(),
            note: request.note.clone(),
            status: BookingStatus::Requested,
        };
        world.bookings.push(booking.clone());
        if let Some(owner) = &provider.owner_user_id {
            world.notify(
                owner,
                "New booking request".into(),
                format!("{} on {} at {}", booking.pet_name, booking.date, booking.time_slot),
                now,
            );
        }
        Ok(booking)
    }

    async fn update_booking_status(
        &self,
        booking_id: &str,
        update: &BookingStatusUpdate,
    ) -> GatewayResult<Booking> {
        self.enter_write()?;
        let mut world = self.world.lock();
        let booking = world
            .bookings
            .iter()
            .find(|b| b.id == booking_id)
            .cloned()
            .ok_or_else(|| not_found("booking", booking_id))?;
        if !booking.status.can_transition_to(update.status) {
            return Err(GatewayError::status(
                422,
                format!("cannot move from {} to {}", booking.status, update.status),
            ));
        }
        let allowed = match update.status.required_actor() {
            ActorRole::BookingOwner => booking.owner_user_id == update.actor_user_id,
            ActorRole::ProviderOwner => world
                .provider(&booking.provider_id)?
                .is_owned_by(&update.actor_user_id),
        };
        if !allowed {
            return Err(GatewayError::status(403, "actor may not apply this status"));
        }
        let Some(stored) = world.bookings.iter_mut().find(|b| b.id == booking_id) else {
            return Err(not_found("booking", booking_id));
        };
        stored.status = update.status;
        Ok(stored.clone())
    }

    async fn list_bookings(
        &self,
        user_id: &str,
        role: CalendarRole,
    ) -> GatewayResult<Vec<Booking>> {
        self.enter()?;
        let world = self.world.lock();
        Ok(world
            .bookings
            .iter()
            .filter(|b| match role {
                CalendarRole::Owner => b.owner_user_id == user_id,
                CalendarRole::Provider => world
                    .provider(&b.provider_id)
                    .is_ok_and(|p| p.is_owned_by(user_id)),
            })
            .cloned()
            .collect())
    }

    async fn calendar_events(
        &self,
        user_id: &str,
        role: CalendarRole,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> GatewayResult<Vec<CalendarEvent>> {
        let bookings = self.list_bookings(user_id, role).await?;
        let now = self.now();
        let world = self.world.lock();
        let in_range = |d: NaiveDate| d >= date_from && d <= date_to;

        let mut entries: Vec<CalendarEvent> = bookings
            .iter()
            .filter(|b| in_range(b.date))
            .map(|b| CalendarEvent {
                id: format!("cal_{}", b.id),
                kind: CalendarEventKind::Booking,
                title: world
                    .provider(&b.provider_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|_| b.provider_id.clone()),
                subtitle: b.pet_name.clone(),
                date: b.date,
                time_slot: b.time_slot.clone(),
                status: b.status.to_string(),
                provider_id: Some(b.provider_id.clone()),
                booking_id: Some(b.id.clone()),
            })
            .collect();
        if role == CalendarRole::Owner {
            entries.extend(
                world
                    .holds
                    .iter()
                    .filter(|h| h.owner_user_id == user_id && !h.is_expired(now))
                    .filter(|h| in_range(h.date))
                    .map(|h| CalendarEvent {
                        id: format!("cal_{}", h.id),
                        kind: CalendarEventKind::Hold,
                        title: "Held slot".into(),
                        subtitle: String::new(),
                        date: h.date,
                        time_slot: h.time_slot.clone(),
                        status: "held".into(),
                        provider_id: Some(h.provider_id.clone()),
                        booking_id: None,
                    }),
            );
        }
        entries.sort_by(|a, b| (a.date, &a.time_slot, &a.id).cmp(&(b.date, &b.time_slot, &b.id)));
        Ok(entries)
    }

    async fn create_quote(&self, draft: &QuoteDraft) -> GatewayResult<QuoteBundle> {
        self.enter()?;
        draft.validate().map_err(invalid)?;
        let now = self.now();
        let mut world = self.world.lock();
        let request_id = world.next_id("quote");
        let matches: Vec<(String, String)> = world
            .providers
            .iter()
            .filter(|p| {
                p.is_active()
                    && p.category == draft.category
                    && same_suburb(&p.suburb, &draft.suburb)
                    && !p.is_owned_by(&draft.user_id)
            })
            .filter_map(|p| p.owner_user_id.clone().map(|owner| (p.id.clone(), owner)))
            .collect();

        let mut targets = Vec::with_capacity(matches.len());
        for (provider_id, owner) in matches {
            targets.push(QuoteTarget {
                id: world.next_id("qt"),
                quote_request_id: request_id.clone(),
                provider_id,
                provider_owner_user_id: owner,
                status: QuoteTargetStatus::Pending,
                response_message: String::new(),
                created_at: now,
                responded_at: None,
                reminder_15_sent: false,
                reminder_60_sent: false,
            });
        }
        let bundle = QuoteBundle {
            request: QuoteRequest {
                id: request_id,
                owner_user_id: draft.user_id.clone(),
                category: draft.category,
                suburb: draft.suburb.trim().to_string(),
                preferred_window: draft.preferred_window.trim().to_string(),
                pet_details: draft.pet_details.trim().to_string(),
                note: draft.note.clone(),
                status: QuoteRequestStatus::derive(&targets),
                created_at: now,
            },
            targets,
        };
        world.quotes.push(bundle.clone());
        Ok(bundle)
    }

    async fn respond_quote_target(
        &self,
        target_id: &str,
        response: &QuoteResponse,
    ) -> GatewayResult<QuoteTarget> {
        self.enter()?;
        let now = self.now();
        let mut world = self.world.lock();
        let Some(bundle) = world
            .quotes
            .iter_mut()
            .find(|b| b.target(target_id).is_some())
        else {
            return Err(not_found("quote target", target_id));
        };
        let Some(mut target) = bundle.target(target_id).cloned() else {
            return Err(not_found("quote target", target_id));
        };
        if target.provider_owner_user_id != response.actor_user_id {
            return Err(GatewayError::status(403, "not the provider owner"));
        }
        if target.is_answered() {
            return Err(GatewayError::status(409, "quote target already answered"));
        }
        target.status = response.decision.into();
        target.response_message = response.message.clone();
        target.responded_at = Some(now);
        bundle.replace_target(target.clone());
        Ok(target)
    }

    async fn list_quotes(&self, user_id: &str) -> GatewayResult<Vec<QuoteBundle>> {
        self.enter()?;
        let now = self.now();
        let mut world = self.world.lock();
        world.dispatch_reminders(now);
        Ok(world
            .quotes
            .iter()
            .filter(|b| {
                b.request.owner_user_id == user_id
                    || b.targets.iter().any(|t| t.provider_owner_user_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn list_groups(&self, user_id: &str) -> GatewayResult<Vec<Group>> {
        self.enter()?;
        Ok(self.groups_for(user_id))
    }

    async fn create_group(&self, draft: &GroupDraft) -> GatewayResult<Group> {
        self.enter_write()?;
        draft.validate().map_err(invalid)?;
        let mut world = self.world.lock();
        if let Some(existing) = world
            .groups
            .iter()
            .find(|g| g.group.client_ref == Some(draft.client_ref))
        {
            return Ok(existing.view_for(Some(&draft.user_id)));
        }
        let mut group = draft.to_local_group();
        group.id = world.next_id("grp");
        let record = GroupRecord {
            group,
            members: BTreeMap::from([(draft.user_id.clone(), MembershipStatus::Member)]),
        };
        let view = record.view_for(Some(&draft.user_id));
        world.groups.push(record);
        Ok(view)
    }

    async fn join_group(&self, group_id: &str, user_id: &str) -> GatewayResult<Group> {
        self.enter_write()?;
        let mut world = self.world.lock();
        let record = world.group(group_id)?;
        let status = if record.group.official {
            MembershipStatus::Member
        } else {
            MembershipStatus::Pending
        };
        let entry = record
            .members
            .entry(user_id.to_string())
            .or_insert(MembershipStatus::None);
        if *entry != MembershipStatus::Member {
            *entry = status;
        }
        Ok(record.view_for(Some(user_id)))
    }

    async fn create_invite(
        &self,
        group_id: &str,
        inviter_user_id: &str,
    ) -> GatewayResult<GroupInvite> {
        self.enter()?;
        let now = self.now();
        let mut world = self.world.lock();
        let group = world.group(group_id)?.group.clone();
        let token = world.next_id("inv");
        let invite = GroupInvite {
            invite_url: format!("https://pawsync.app/invite/{token}"),
            token,
            group_id: group.id,
            group_name: group.name,
            suburb: group.suburb,
            inviter_user_id: inviter_user_id.to_string(),
            expires_at: now + Duration::hours(INVITE_TTL_HOURS),
        };
        world.invites.push(invite.clone());
        Ok(invite)
    }

    async fn resolve_invite(&self, token: &str) -> GatewayResult<GroupInvite> {
        self.enter()?;
        let now = self.now();
        let world = self.world.lock();
        let invite = world
            .invites
            .iter()
            .find(|i| i.token == token)
            .ok_or_else(|| not_found("invite", token))?;
        if invite.is_expired(now) {
            return Err(GatewayError::status(410, "invite expired"));
        }
        Ok(invite.clone())
    }

    async fn complete_onboarding(
        &self,
        request: &OnboardingRequest,
    ) -> GatewayResult<OnboardingResult> {
        let invite = self.resolve_invite(&request.invite_token).await?;
        request.validate().map_err(invalid)?;
        let now = self.now();
        let mut world = self.world.lock();
        let user_id = world.next_id("user");
        world
            .group(&invite.group_id)?
            .members
            .insert(user_id.clone(), MembershipStatus::Member);

        let created_post_id = if request.share_photo_to_group {
            let id = world.next_id("post");
            let dog = request.dog_name.trim().to_string();
            world.posts.insert(
                0,
                CommunityPost {
                    id: id.clone(),
                    kind: PostKind::GroupPost,
                    title: format!("Say hi to {dog}"),
                    body: format!("{} just joined with {dog}", request.owner_name.trim()),
                    suburb: request.suburb.clone().unwrap_or(invite.suburb.clone()),
                    author_user_id: Some(user_id.clone()),
                    group_id: Some(invite.group_id.clone()),
                    pet_name: Some(dog),
                    photo_url: request.photo_source.clone(),
                    created_at: now,
                    client_ref: None,
                },
            );
            Some(id)
        } else {
            None
        };
        Ok(OnboardingResult {
            user_id,
            group_id: invite.group_id,
            membership_status: MembershipStatus::Member,
            created_post_id,
        })
    }

    async fn list_posts(&self, suburb: Option<&str>) -> GatewayResult<Vec<CommunityPost>> {
        self.enter()?;
        let world = self.world.lock();
        let mut posts: Vec<CommunityPost> = world
            .posts
            .iter()
            .filter(|p| suburb.map_or(true, |s| same_suburb(s, &p.suburb)))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(posts)
    }

    async fn create_post(&self, draft: &PostDraft) -> GatewayResult<CommunityPost> {
        self.enter_write()?;
        draft.validate().map_err(invalid)?;
        let now = self.now();
        let mut world = self.world.lock();
        if let Some(existing) = world
            .posts
            .iter()
            .find(|p| p.client_ref == Some(draft.client_ref))
        {
            return Ok(existing.clone());
        }
        let mut post = draft.to_local_post(now);
        post.id = world.next_id("post");
        world.posts.insert(0, post.clone());
        Ok(post)
    }

    async fn list_events(
        &self,
        user_id: Option<&str>,
        suburb: Option<&str>,
    ) -> GatewayResult<Vec<CommunityEvent>> {
        self.enter()?;
        let world = self.world.lock();
        Ok(world
            .events
            .iter()
            .filter(|e| suburb.map_or(true, |s| same_suburb(s, &e.event.suburb)))
            .filter(|e| {
                e.event.status == EventStatus::Approved
                    || user_id.is_some_and(|u| e.event.created_by == u)
            })
            .map(|e| e.view_for(user_id))
            .collect())
    }

    async fn create_event(&self, draft: &EventDraft) -> GatewayResult<CommunityEvent> {
        self.enter_write()?;
        draft.validate().map_err(invalid)?;
        let mut world = self.world.lock();
        if let Some(existing) = world
            .events
            .iter()
            .find(|e| e.event.client_ref == Some(draft.client_ref))
        {
            return Ok(existing.view_for(Some(&draft.user_id)));
        }
        let admin_creates = match &draft.group_id {
            Some(group_id) => world.group(group_id)?.group.owner_user_id.as_deref()
                == Some(draft.user_id.as_str()),
            None => true,
        };
        let mut event = draft.to_local_event();
        event.id = world.next_id("evt");
        event.status = if admin_creates {
            EventStatus::Approved
        } else {
            EventStatus::PendingApproval
        };
        let record = EventRecord {
            event,
            attendees: BTreeSet::from([draft.user_id.clone()]),
        };
        let view = record.view_for(Some(&draft.user_id));
        world.events.push(record);
        Ok(view)
    }

    async fn rsvp_event(&self, event_id: &str, user_id: &str) -> GatewayResult<CommunityEvent> {
        self.enter_write()?;
        let mut world = self.world.lock();
        let record = world.event(event_id)?;
        record.attendees.insert(user_id.to_string());
        Ok(record.view_for(Some(user_id)))
    }

    async fn approve_event(
        &self,
        event_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<CommunityEvent> {
        self.enter_write()?;
        let mut world = self.world.lock();
        let group_id = world.event(event_id)?.event.group_id.clone();
        let is_admin = match group_id {
            Some(group_id) => {
                world.group(&group_id)?.group.owner_user_id.as_deref() == Some(actor_user_id)
            }
            None => false,
        };
        if !is_admin {
            return Err(GatewayError::status(403, "only the group admin may approve"));
        }
        let record = world.event(event_id)?;
        record.event.status = EventStatus::Approved;
        Ok(record.view_for(Some(actor_user_id)))
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> GatewayResult<Vec<Notification>> {
        self.enter()?;
        let world = self.world.lock();
        let mut notifications: Vec<Notification> = world
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !(unread_only && n.read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        notification_id: &str,
    ) -> GatewayResult<Notification> {
        self.enter()?;
        let mut world = self.world.lock();
        let notification = world
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| not_found("notification", notification_id))?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn list_messages(&self, user_id: &str) -> GatewayResult<Vec<DirectMessage>> {
        self.enter()?;
        let world = self.world.lock();
        Ok(world
            .messages
            .iter()
            .filter(|m| m.counterparty_of(user_id).is_some())
            .cloned()
            .collect())
    }

    async fn chat(&self, request: &ChatRequest) -> GatewayResult<ChatReply> {
        self.enter()?;
        Ok(self.chat_answer(request))
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> GatewayResult<mpsc::Receiver<ChatStreamEvent>> {
        self.enter()?;
        let reply = self.chat_answer(request);
        let mut deltas: Vec<String> = reply
            .answer
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        if deltas.is_empty() {
            deltas.push(String::new());
        }
        let (tx, rx) = mpsc::channel(deltas.len() + 1);
        for delta in deltas {
            tx.try_send(ChatStreamEvent::Delta { delta })
                .map_err(|e| GatewayError::Network(e.to_string()))?;
        }
        tx.try_send(ChatStreamEvent::Final { response: reply })
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::fixtures::{date, provider, seeded_gateway};
    use pawsync_model::{Category, ClientRef, QuoteDecision};

    fn gateway() -> (Arc<FixedClock>, MemoryGateway) {
        let clock = Arc::new(FixedClock::at(2026, 2, 28));
        let gateway = seeded_gateway(clock.clone());
        (clock, gateway)
    }

    fn hold(user: &str) -> HoldRequest {
        HoldRequest {
            user_id: user.into(),
            provider_id: "p1".into(),
            date: date(2026, 3, 1),
            time_slot: "09:00".into(),
        }
    }

    #[tokio::test]
    async fn second_user_cannot_hold_a_held_slot() {
        let (_, gw) = gateway();
        gw.create_hold(&hold("user_2")).await.unwrap();
        let err = gw.create_hold(&hold("user_3")).await.unwrap_err();
        assert_eq!(err.status_code(), Some(409));
        let again = gw.create_hold(&hold("user_2")).await.unwrap_err();
        assert_eq!(again.status_code(), Some(409));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_suburb_delays_its_listing() {
        let (_, gw) = gateway();
        gw.delay_suburb("Glebe", std::time::Duration::from_secs(3));
        let glebe = ProviderQuery {
            suburb: Some("Glebe".into()),
            ..ProviderQuery::default()
        };

        let started = tokio::time::Instant::now();
        assert_eq!(gw.list_providers(&glebe).await.unwrap().len(), 1);
        assert!(started.elapsed() >= std::time::Duration::from_secs(3));

        let started = tokio::time::Instant::now();
        gw.list_providers(&ProviderQuery::default()).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn expired_hold_frees_the_slot() {
        let (clock, gw) = gateway();
        gw.create_hold(&hold("user_2")).await.unwrap();
        clock.advance(Duration::minutes(16));
        assert!(gw.create_hold(&hold("user_3")).await.is_ok());
    }

    #[tokio::test]
    async fn quote_fans_out_to_matching_providers() {
        let (clock, gw) = gateway();
        let bundle = gw
            .create_quote(&QuoteDraft {
                user_id: "user_2".into(),
                category: Category::Grooming,
                suburb: "newtown".into(),
                preferred_window: "Saturday morning".into(),
                pet_details: "Beagle, 3y".into(),
                note: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(bundle.targets.len(), 2);

        clock.advance(Duration::minutes(20));
        let quotes = gw.list_quotes("user_2").await.unwrap();
        assert!(quotes[0].targets.iter().all(|t| t.reminder_15_sent));
        assert!(quotes[0].targets.iter().all(|t| !t.reminder_60_sent));

        let first = &bundle.targets[0];
        gw.respond_quote_target(
            &first.id,
            &QuoteResponse {
                actor_user_id: first.provider_owner_user_id.clone(),
                decision: QuoteDecision::Accepted,
                message: "Can do 10am".into(),
            },
        )
        .await
        .unwrap();
        let quotes = gw.quotes();
        assert_eq!(quotes[0].request.status, QuoteRequestStatus::Responded);
        assert_eq!(quotes[0].targets[1].status, QuoteTargetStatus::Pending);
    }

    #[tokio::test]
    async fn rejected_writes_use_the_configured_status() {
        let (_, gw) = gateway();
        gw.reject_writes(Some(405));
        let draft = ProviderDraft {
            user_id: "user_2".into(),
            name: "Biscuit's Baths".into(),
            category: Category::Grooming,
            suburb: "Glebe".into(),
            description: String::new(),
            price_from: 40,
            client_ref: ClientRef::new(),
        };
        assert_eq!(gw.create_provider(&draft).await.unwrap_err().status_code(), Some(405));
        let cancel = gw.cancel_provider("p1", "user_1").await.unwrap_err();
        assert_eq!(cancel.status_code(), Some(405));
        assert!(gw.providers()[0].is_active());
        gw.reject_writes(None);
        let first = gw.create_provider(&draft).await.unwrap();
        let second = gw.create_provider(&draft).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.client_ref, Some(draft.client_ref));
    }

    #[tokio::test]
    async fn cancel_cascades_to_active_bookings() {
        let (_, gw) = gateway();
        gw.add_provider(provider("p9", "user_9", Category::DogWalking, "Glebe"));
        gw.create_booking(&BookingRequest {
            user_id: "user_2".into(),
            provider_id: "p9".into(),
            pet_name: "Biscuit".into(),
            date: date(2026, 3, 2),
            time_slot: "10:00".into(),
            note: String::new(),
        })
        .await
        .unwrap();
        assert_eq!(
            gw.cancel_provider("p9", "user_2").await.unwrap_err().status_code(),
            Some(403)
        );
        gw.cancel_provider("p9", "user_9").await.unwrap();
        assert_eq!(gw.bookings()[0].status, BookingStatus::CancelledByProvider);
    }

    #[tokio::test]
    async fn offline_fails_every_call() {
        let (_, gw) = gateway();
        gw.set_offline(true);
        let err = gw.list_posts(None).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(gw.call_count(), 1);
    }

    #[tokio::test]
    async fn stream_ends_with_final() {
        let (_, gw) = gateway();
        let mut rx = gw
            .stream_chat(&ChatRequest {
                conversation_id: "c1".into(),
                user_id: "user_2".into(),
                message: "walkers near me".into(),
                suburb: None,
            })
            .await
            .unwrap();
        let mut text = String::new();
        let mut finished = None;
        while let Some(event) = rx.recv().await {
            match event {
                ChatStreamEvent::Delta { delta } => text.push_str(&delta),
                ChatStreamEvent::Final { response } => finished = Some(response),
            }
        }
        let reply = finished.unwrap();
        assert_eq!(text, reply.answer);
        assert_eq!(reply.answer, "You said: walkers near me");
    }
}
