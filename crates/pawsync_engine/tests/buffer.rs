//! Integration tests for buffered writes and their reconciliation.

use pawsync_engine::{
    ConnectionMode, EngineConfig, EngineError, Environment, Gateway, PendingWrite, SyncParams,
};
use pawsync_model::{
    BookingRequest, BookingStatus, BookingStatusUpdate, Category, ClientRef, EventDraft,
    GroupDraft, MembershipStatus, PostDraft, PostKind, ProviderDraft, ProviderStatus,
    ProviderUpdate, RsvpStatus,
};
use pawsync_testkit::prelude::*;

fn nala_post() -> PostDraft {
    PostDraft {
        user_id: OWNER.into(),
        kind: PostKind::GroupPost,
        title: "Nala's first beach day".into(),
        body: "She loved it".into(),
        suburb: "Newtown".into(),
        group_id: Some("g1".into()),
        pet_name: Some("Nala".into()),
        photo_url: None,
        client_ref: ClientRef::new(),
    }
}

fn listing() -> ProviderDraft {
    ProviderDraft {
        user_id: OWNER.into(),
        name: "Weekend Walks".into(),
        category: Category::DogWalking,
        suburb: "Newtown".into(),
        description: String::new(),
        price_from: 25,
        client_ref: ClientRef::new(),
    }
}

#[tokio::test]
async fn unsupported_write_is_shown_and_reconciled_after_replay() {
    let mut t = TestEngine::new();
    t.sync(t.owner_params()).await.unwrap();
    t.gateway.reject_writes(Some(405));

    let draft = nala_post();
    let committed = t.create_post(draft.clone()).await.unwrap();
    assert!(committed.is_local());
    assert_eq!(committed.entity().id, draft.client_ref.local_id());

    let state = t.current();
    assert!(state.pending_sync);
    assert_eq!(state.mode, ConnectionMode::Online);
    assert_eq!(state.snapshot.posts[0].client_ref, Some(draft.client_ref));
    assert!(state.views.roster.iter().any(|r| r.pet_name == "Nala"));
    assert_eq!(t.pending_writes().len(), 1);

    // The write survives a restart.
    t.reopen();
    assert!(matches!(t.pending_writes()[0], PendingWrite::Post { .. }));
    let report = t.sync(t.owner_params()).await.unwrap();
    assert!(report.pending_sync);
    assert_eq!(report.reconciled, 0);
    assert!(t
        .current()
        .snapshot
        .posts
        .iter()
        .any(|p| p.client_ref == Some(draft.client_ref)));

    t.gateway.reject_writes(None);
    let replay = t.replay_pending().await.unwrap();
    assert_eq!(replay.sent, 1);
    assert_eq!(replay.remaining, 0);

    let state = t.current();
    assert!(t.pending_writes().is_empty());
    assert!(!state.pending_sync);
    let copies: Vec<_> = state
        .snapshot
        .posts
        .iter()
        .filter(|p| p.client_ref == Some(draft.client_ref))
        .collect();
    assert_eq!(copies.len(), 1);
    assert!(copies[0].id.starts_with("post_"));
}

#[tokio::test]
async fn failed_replay_keeps_the_write() {
    let t = TestEngine::new();
    t.sync(t.owner_params()).await.unwrap();
    t.gateway.reject_writes(Some(405));
    t.create_post(nala_post()).await.unwrap();

    let replay = t.replay_pending().await.unwrap();
    assert_eq!(replay.sent, 0);
    assert_eq!(replay.remaining, 1);
    assert_eq!(t.pending_writes().len(), 1);
}

#[tokio::test]
async fn trusted_tier_surfaces_network_failures() {
    let t = TestEngine::new();
    t.sync(t.owner_params()).await.unwrap();
    t.gateway.set_offline(true);

    let err = t.create_post(nala_post()).await.unwrap_err();
    assert!(matches!(err, EngineError::NetworkUnavailable(_)), "{err}");
    assert!(t.pending_writes().is_empty());
}

#[tokio::test]
async fn low_trust_tier_buffers_network_failures() {
    let t = TestEngine::with_config(EngineConfig::new(Environment::Dev));
    t.sync(t.owner_params()).await.unwrap();
    t.gateway.set_offline(true);

    let committed = t.create_listing(listing()).await.unwrap();
    assert!(committed.is_local());

    let state = t.current();
    assert!(state.is_offline_mode());
    assert!(state.pending_sync);
    assert_eq!(state.views.listings.len(), 1);
    assert_eq!(state.views.listings[0].name, "Weekend Walks");
}

#[tokio::test]
async fn low_trust_tier_still_rejects_invalid_input() {
    let t = TestEngine::with_config(EngineConfig::new(Environment::Dev));
    t.sync(t.owner_params()).await.unwrap();

    let mut draft = nala_post();
    draft.title = "   ".into();
    let err = t.create_post(draft).await.unwrap_err();
    assert!(matches!(err, EngineError::ValidationFailed(_)), "{err}");
    assert!(t.pending_writes().is_empty());
}

#[tokio::test]
async fn mock_mode_keeps_every_write_local() {
    let t = TestEngine::with_config(test_config().with_mock_data(true));
    t.sync(t.owner_params()).await.unwrap();

    let draft = GroupDraft {
        user_id: OWNER.into(),
        name: "Beagle Brunch".into(),
        suburb: "Glebe".into(),
        client_ref: ClientRef::new(),
    };
    let committed = t.create_group(draft).await.unwrap();
    assert!(committed.is_local());
    assert!(committed.entity().is_admin);

    let state = t.current();
    assert!(state.pending_sync);
    assert_eq!(state.snapshot.groups.len(), 1);
    assert_eq!(t.gateway.call_count(), 0);
}

fn walk_request() -> BookingRequest {
    BookingRequest {
        user_id: OWNER.into(),
        provider_id: "p1".into(),
        pet_name: "Biscuit".into(),
        date: date(2026, 3, 1),
        time_slot: "09:00".into(),
        note: String::new(),
    }
}

fn kinds(t: &TestEngine) -> Vec<&'static str> {
    t.pending_writes().iter().map(PendingWrite::kind).collect()
}

#[tokio::test]
async fn listing_changes_are_buffered_and_replayed() {
    let t = TestEngine::new();
    t.sync(SyncParams::for_user(WALKER)).await.unwrap();
    t.gateway.reject_writes(Some(405));

    let cancelled = t.cancel_listing("p1", WALKER).await.unwrap();
    assert_eq!(cancelled.status, ProviderStatus::Cancelled);
    let state = t.current();
    assert!(state.pending_sync);
    assert_eq!(state.views.listings[0].status, ProviderStatus::Cancelled);
    assert_eq!(kinds(&t), vec!["listing_status"]);
    let remote = t.gateway.providers();
    assert!(remote.iter().any(|p| p.id == "p1" && p.is_active()));

    // Restoring replaces the buffered cancel, and the server already agrees.
    let restored = t.restore_listing("p1", WALKER).await.unwrap();
    assert_eq!(restored.status, ProviderStatus::Active);
    assert!(t.pending_writes().is_empty());
    assert!(!t.current().pending_sync);

    let update = ProviderUpdate {
        actor_user_id: WALKER.into(),
        price_from: Some(45),
        ..ProviderUpdate::default()
    };
    let updated = t.update_listing("p1", update).await.unwrap();
    assert_eq!(updated.price_from, 45);
    assert_eq!(t.current().views.listings[0].price_from, 45);
    assert_eq!(kinds(&t), vec!["listing_update"]);

    t.gateway.reject_writes(None);
    let replay = t.replay_pending().await.unwrap();
    assert_eq!(replay.sent, 1);
    assert!(t.pending_writes().is_empty());
    assert!(!t.current().pending_sync);
    let remote = t.gateway.providers();
    assert_eq!(remote.iter().find(|p| p.id == "p1").unwrap().price_from, 45);
}

#[tokio::test]
async fn booking_and_community_changes_fall_back_locally() {
    let t = TestEngine::new();
    t.sync(t.owner_params()).await.unwrap();
    let booking = t.request_booking(walk_request()).await.unwrap().booking;
    let event = t
        .create_event(EventDraft {
            user_id: WALKER.into(),
            title: "Park loop".into(),
            description: String::new(),
            suburb: "Newtown".into(),
            date: date(2026, 3, 7),
            group_id: None,
            client_ref: ClientRef::new(),
        })
        .await
        .unwrap()
        .into_inner();
    t.refresh().await.unwrap();
    t.gateway.reject_writes(Some(405));

    let cancelled = t
        .respond_to_booking(&booking.id, OWNER, BookingStatus::CancelledByOwner, "")
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::CancelledByOwner);
    let err = t
        .respond_to_booking(&booking.id, OWNER, BookingStatus::CancelledByOwner, "")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }), "{err}");

    let joined = t.join_group("g2", OWNER).await.unwrap();
    assert_eq!(joined.membership_status, MembershipStatus::Pending);
    let attending = t.rsvp_event(&event.id, OWNER).await.unwrap();
    assert_eq!(attending.rsvp_status, RsvpStatus::Attending);
    assert_eq!(attending.attendee_count, 2);

    assert_eq!(kinds(&t), vec!["booking_status", "join_group", "rsvp"]);
    let state = t.current();
    assert!(state.pending_sync);
    assert_eq!(state.snapshot.owner_bookings[0].status, BookingStatus::CancelledByOwner);
    assert_eq!(t.gateway.bookings()[0].status, BookingStatus::Requested);

    t.gateway.reject_writes(None);
    let replay = t.replay_pending().await.unwrap();
    assert_eq!(replay.sent, 3);
    assert!(t.pending_writes().is_empty());
    assert_eq!(t.gateway.bookings()[0].status, BookingStatus::CancelledByOwner);
    let g2 = t.gateway.groups_for(OWNER).into_iter().find(|g| g.id == "g2").unwrap();
    assert_eq!(g2.membership_status, MembershipStatus::Pending);
}

#[tokio::test]
async fn replay_drops_changes_the_server_rejects() {
    let t = TestEngine::new();
    t.sync(t.owner_params()).await.unwrap();
    let booking = t.request_booking(walk_request()).await.unwrap().booking;
    t.gateway.reject_writes(Some(405));
    t.respond_to_booking(&booking.id, OWNER, BookingStatus::CancelledByOwner, "")
        .await
        .unwrap();

    // The walker declines from another device before the cancel lands.
    t.gateway.reject_writes(None);
    let decline = BookingStatusUpdate {
        actor_user_id: WALKER.into(),
        status: BookingStatus::ProviderDeclined,
        note: String::new(),
    };
    t.gateway
        .update_booking_status(&booking.id, &decline)
        .await
        .unwrap();

    let replay = t.replay_pending().await.unwrap();
    assert_eq!(replay.dropped, 1);
    assert_eq!(replay.remaining, 0);
    assert!(t.pending_writes().is_empty());
    let state = t.current();
    assert!(!state.pending_sync);
    assert_eq!(state.snapshot.owner_bookings[0].status, BookingStatus::ProviderDeclined);
}
