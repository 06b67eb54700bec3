//! Test fixtures and engine helpers.
//!
//! Provides entity builders, a seeded marketplace and a [`TestEngine`] that
//! wires an engine to the in-memory backend, a fixed clock and an in-memory
//! cache that outlives the engine.

use crate::backend::MemoryGateway;
use crate::clock::FixedClock;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use pawsync_engine::{Engine, EngineConfig, Environment, SyncParams};
use pawsync_model::{
    Category, CommunityPost, DirectMessage, Group, MembershipStatus, PostKind, Provider,
    ProviderStatus, SocialProof,
};
use pawsync_storage::InMemoryBlobStore;
use std::sync::Arc;

/// The signed-in pet owner used throughout the fixtures.
pub const OWNER: &str = "user_2";

/// A second pet owner competing for the same slots.
pub const OTHER_OWNER: &str = "user_3";

/// Owner of the walking listing `p1` and admin of group `g1`.
pub const WALKER: &str = "user_1";

/// Owner of the Newtown grooming listing `p3`.
pub const GROOMER: &str = "user_4";

/// Builds a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Builds a UTC instant.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid instant")
}

/// Builds an active provider.
pub fn provider(id: &str, owner: &str, category: Category, suburb: &str) -> Provider {
    Provider {
        id: id.to_string(),
        name: format!("{suburb} {category} {id}"),
        category,
        suburb: suburb.to_string(),
        description: String::new(),
        price_from: 35,
        rating: 4.5,
        review_count: 12,
        latitude: -33.89,
        longitude: 151.18,
        distance_km: Some(1.5),
        owner_user_id: Some(owner.to_string()),
        owner_label: None,
        status: ProviderStatus::Active,
        social_proof: SocialProof::default(),
        client_ref: None,
    }
}

/// Builds a post about a pet.
pub fn pet_post(id: &str, pet: &str, suburb: &str, created_at: DateTime<Utc>) -> CommunityPost {
    CommunityPost {
        id: id.to_string(),
        kind: PostKind::GroupPost,
        title: format!("Meet {pet}"),
        body: String::new(),
        suburb: suburb.to_string(),
        author_user_id: None,
        group_id: None,
        pet_name: Some(pet.to_string()),
        photo_url: Some(format!("https://img.pawsync.app/{id}.jpg")),
        created_at,
        client_ref: None,
    }
}

/// Builds a direct message.
pub fn message(
    id: &str,
    from: &str,
    to: &str,
    body: &str,
    sent_at: DateTime<Utc>,
) -> DirectMessage {
    DirectMessage {
        id: id.to_string(),
        sender_user_id: from.to_string(),
        recipient_user_id: to.to_string(),
        body: body.to_string(),
        sent_at,
        read: false,
    }
}

/// Builds a group owned by `owner`.
pub fn group(id: &str, name: &str, suburb: &str, official: bool, owner: &str) -> Group {
    Group {
        id: id.to_string(),
        name: name.to_string(),
        suburb: suburb.to_string(),
        member_count: 0,
        official,
        owner_user_id: Some(owner.to_string()),
        membership_status: MembershipStatus::None,
        is_admin: false,
        pending_request_count: 0,
        client_ref: None,
    }
}

/// Seeds a small marketplace around Newtown and Glebe.
///
/// | id | category | suburb | owner |
/// |----|----------|--------|-------|
/// | p1 | dog walking | Newtown | user_1 |
/// | p2 | grooming | Glebe | user_4 |
/// | p3 | grooming | Newtown | user_4 |
/// | p4 | dog walking | Newtown | user_5 |
/// | p5 | grooming | Newtown | user_6 |
///
/// Group `g1` is the official Newtown group run by `user_1`; `g2` is a
/// private Glebe group run by `user_4`.
pub fn seed_marketplace(gateway: &MemoryGateway) {
    let mut p1 = provider("p1", WALKER, Category::DogWalking, "Newtown");
    p1.name = "Happy Paws Walking".into();
    p1.rating = 4.9;
    gateway.add_provider(p1);
    gateway.add_provider(provider("p2", GROOMER, Category::Grooming, "Glebe"));
    let mut p3 = provider("p3", GROOMER, Category::Grooming, "Newtown");
    p3.name = "Suds & Scissors".into();
    gateway.add_provider(p3);
    let mut p4 = provider("p4", "user_5", Category::DogWalking, "Newtown");
    p4.rating = 4.1;
    gateway.add_provider(p4);
    gateway.add_provider(provider("p5", "user_6", Category::Grooming, "Newtown"));

    gateway.add_group(
        group("g1", "Newtown Dogs", "Newtown", true, WALKER),
        &[(WALKER, MembershipStatus::Member), (OWNER, MembershipStatus::Member)],
    );
    gateway.add_group(
        group("g2", "Glebe Groomers Club", "Glebe", false, GROOMER),
        &[(GROOMER, MembershipStatus::Member)],
    );

    gateway.add_post(pet_post("post_a", "Biscuit", "Newtown", at(2026, 2, 27, 8, 0)));
    gateway.add_post(pet_post("post_b", "Mochi", "Newtown", at(2026, 2, 26, 9, 30)));
    gateway.add_post(pet_post("post_c", "Pepper", "Glebe", at(2026, 2, 25, 17, 0)));
    gateway.add_post(pet_post("post_d", "Rex", "Newtown", at(2026, 1, 2, 7, 0)));

    gateway.add_message(message("m1", WALKER, OWNER, "See you at 9", at(2026, 2, 27, 18, 0)));
    gateway.add_message(message("m2", OWNER, WALKER, "Thanks!", at(2026, 2, 27, 18, 5)));
    gateway.add_message(message("m3", GROOMER, OWNER, "Slot free Sat", at(2026, 2, 26, 10, 0)));
}

/// Creates a seeded backend on `clock`.
pub fn seeded_gateway(clock: Arc<FixedClock>) -> MemoryGateway {
    let gateway = MemoryGateway::new(clock);
    seed_marketplace(&gateway);
    gateway
}

/// Engine configuration used by [`TestEngine`]: production tier, so failed
/// writes are not buffered unless a test opts in.
pub fn test_config() -> EngineConfig {
    EngineConfig::new(Environment::Prod)
}

/// An engine wired to the reference backend.
pub struct TestEngine {
    /// The engine instance.
    pub engine: Engine,
    /// The backend the engine talks to.
    pub gateway: Arc<MemoryGateway>,
    /// The clock shared by engine and backend.
    pub clock: Arc<FixedClock>,
    /// The cache (kept alive across reopens).
    pub blobs: Arc<InMemoryBlobStore>,
    config: EngineConfig,
}

impl TestEngine {
    /// Creates an engine over the seeded marketplace on 2026-02-28.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates an engine over the seeded marketplace with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(FixedClock::at(2026, 2, 28));
        let gateway = Arc::new(seeded_gateway(Arc::clone(&clock)));
        let blobs = Arc::new(InMemoryBlobStore::new());
        let engine = open(&config, &gateway, &blobs, &clock);
        Self {
            engine,
            gateway,
            clock,
            blobs,
            config,
        }
    }

    /// Replaces the engine with a fresh one over the same cache and backend,
    /// as after an app restart.
    pub fn reopen(&mut self) {
        self.engine = open(&self.config, &self.gateway, &self.blobs, &self.clock);
    }

    /// Default sync parameters for [`OWNER`].
    pub fn owner_params(&self) -> SyncParams {
        SyncParams::for_user(OWNER)
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn open(
    config: &EngineConfig,
    gateway: &Arc<MemoryGateway>,
    blobs: &Arc<InMemoryBlobStore>,
    clock: &Arc<FixedClock>,
) -> Engine {
    Engine::open(
        config.clone(),
        Arc::clone(gateway) as _,
        Arc::clone(blobs) as _,
        Arc::clone(clock) as _,
    )
    .expect("Failed to open engine")
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_has_two_newtown_groomers() {
        let clock = Arc::new(FixedClock::at(2026, 2, 28));
        let gateway = seeded_gateway(clock);
        let groomers = gateway
            .providers()
            .into_iter()
            .filter(|p| p.category == Category::Grooming && p.suburb == "Newtown")
            .count();
        assert_eq!(groomers, 2);
        assert_eq!(gateway.groups_for(OWNER)[0].membership_status, MembershipStatus::Member);
    }
}
