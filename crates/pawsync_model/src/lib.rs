//! # Pawsync Model
//!
//! Entity types and invariants for the Pawsync pet-services client.
//!
//! This crate provides:
//! - Marketplace entities (providers, holds, bookings, quotes)
//! - Community entities (groups, invites, posts, events, notifications)
//! - The booking state machine
//! - The `HomeSnapshot` aggregate that is cached as a single unit
//! - Chat wire types and the closed set of suggested UI actions
//!
//! ## Key Invariants
//!
//! - A cancelled, declined or completed booking never transitions again
//! - Quote targets carry monotonic reminder flags
//! - Every client-originated write carries a [`ClientRef`] so the server
//!   copy can be recognised later

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod booking;
mod chat;
mod community;
mod error;
mod ids;
mod provider;
mod quote;
mod snapshot;

pub use booking::{
    ActorRole, Booking, BookingHold, BookingRequest, BookingStatus, BookingStatusUpdate,
    CalendarEvent, CalendarEventKind, CalendarRole, HoldRequest,
};
pub use chat::{
    ChatReply, ChatRequest, ChatRole, ChatStreamEvent, ChatTurn, CtaChip, UiAction,
};
pub use community::{
    CommunityEvent, CommunityPost, DirectMessage, EventDraft, EventStatus, Group, GroupDraft,
    GroupInvite, MembershipStatus, Notification, NotificationCategory, OnboardingRequest,
    OnboardingResult, PostDraft, PostKind, RsvpStatus,
};
pub use error::{ModelError, ModelResult};
pub use ids::{ClientRef, SlotKey};
pub use provider::{
    AvailabilitySlot, Category, GeoPoint, Provider, ProviderDraft, ProviderQuery, ProviderStatus,
    ProviderUpdate, SlotBlockReason, SocialProof, SortBy,
};
pub use quote::{
    QuoteBundle, QuoteDecision, QuoteDraft, QuoteRequest, QuoteRequestStatus, QuoteResponse,
    QuoteTarget, QuoteTargetStatus, ReminderStage,
};
pub use snapshot::HomeSnapshot;
