//! Remote gateway abstraction.
//!
//! The [`Gateway`] trait is the engine's only view of the marketplace
//! backend. Each method is one REST call; no business logic lives behind
//! it beyond transport and decoding.

use async_trait::async_trait;
use chrono::NaiveDate;
use pawsync_model::{
    AvailabilitySlot, Booking, BookingHold, BookingRequest, BookingStatusUpdate, CalendarEvent,
    CalendarRole, ChatReply, ChatRequest, ChatStreamEvent, CommunityEvent, CommunityPost,
    DirectMessage, EventDraft, Group, GroupDraft, GroupInvite, HoldRequest, Notification,
    OnboardingRequest, OnboardingResult, PostDraft, Provider, ProviderDraft, ProviderQuery,
    ProviderUpdate, QuoteBundle, QuoteDraft, QuoteResponse, QuoteTarget,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Transport-level outcome of a failed gateway call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided detail.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Creates a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status, if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the request did not reach the server.
    pub fn is_network(&self) -> bool {
        matches!(self, GatewayError::Network(_))
    }
}

/// Typed calls against the marketplace backend.
///
/// Implementations must be safe to share between tasks; the engine issues
/// collection fetches concurrently.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `GET providers`. When `query.user_id` is set only that user's
    /// listings are returned.
    async fn list_providers(&self, query: &ProviderQuery) -> GatewayResult<Vec<Provider>>;

    /// `POST providers`.
    async fn create_provider(&self, draft: &ProviderDraft) -> GatewayResult<Provider>;

    /// `POST providers/{id}/update`.
    async fn update_provider(
        &self,
        provider_id: &str,
        update: &ProviderUpdate,
    ) -> GatewayResult<Provider>;

    /// `POST providers/{id}/cancel`.
    async fn cancel_provider(&self, provider_id: &str, actor_user_id: &str)
        -> GatewayResult<Provider>;

    /// `POST providers/{id}/restore`.
    async fn restore_provider(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<Provider>;

    /// `GET providers/{id}/availability?date`.
    async fn availability(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> GatewayResult<Vec<AvailabilitySlot>>;

    /// `POST bookings/holds`.
    async fn create_hold(&self, request: &HoldRequest) -> GatewayResult<BookingHold>;

    /// `POST bookings`.
    async fn create_booking(&self, request: &BookingRequest) -> GatewayResult<Booking>;

    /// `POST bookings/{id}/status`.
    async fn update_booking_status(
        &self,
        booking_id: &str,
        update: &BookingStatusUpdate,
    ) -> GatewayResult<Booking>;

    /// `GET bookings?role`.
    async fn list_bookings(&self, user_id: &str, role: CalendarRole) -> GatewayResult<Vec<Booking>>;

    /// `GET calendar/events?role&dateFrom&dateTo`.
    async fn calendar_events(
        &self,
        user_id: &str,
        role: CalendarRole,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> GatewayResult<Vec<CalendarEvent>>;

    /// `POST quotes`.
    async fn create_quote(&self, draft: &QuoteDraft) -> GatewayResult<QuoteBundle>;

    /// `POST quotes/targets/{id}/respond`.
    async fn respond_quote_target(
        &self,
        target_id: &str,
        response: &QuoteResponse,
    ) -> GatewayResult<QuoteTarget>;

    /// `GET quotes`: requests the user sent or was targeted by.
    async fn list_quotes(&self, user_id: &str) -> GatewayResult<Vec<QuoteBundle>>;

    /// `GET groups`.
    async fn list_groups(&self, user_id: &str) -> GatewayResult<Vec<Group>>;

    /// `POST groups`.
    async fn create_group(&self, draft: &GroupDraft) -> GatewayResult<Group>;

    /// `POST groups/{id}/join`.
    async fn join_group(&self, group_id: &str, user_id: &str) -> GatewayResult<Group>;

    /// `POST invites`.
    async fn create_invite(&self, group_id: &str, inviter_user_id: &str)
        -> GatewayResult<GroupInvite>;

    /// `GET invites/{token}`.
    async fn resolve_invite(&self, token: &str) -> GatewayResult<GroupInvite>;

    /// `POST onboarding/complete`.
    async fn complete_onboarding(
        &self,
        request: &OnboardingRequest,
    ) -> GatewayResult<OnboardingResult>;

    /// `GET posts`.
    async fn list_posts(&self, suburb: Option<&str>) -> GatewayResult<Vec<CommunityPost>>;

    /// `POST posts`.
    async fn create_post(&self, draft: &PostDraft) -> GatewayResult<CommunityPost>;

    /// `GET events`.
    async fn list_events(
        &self,
        user_id: Option<&str>,
        suburb: Option<&str>,
    ) -> GatewayResult<Vec<CommunityEvent>>;

    /// `POST events`.
    async fn create_event(&self, draft: &EventDraft) -> GatewayResult<CommunityEvent>;

    /// `POST events/{id}/rsvp`.
    async fn rsvp_event(&self, event_id: &str, user_id: &str) -> GatewayResult<CommunityEvent>;

    /// `POST events/{id}/approve`.
    async fn approve_event(
        &self,
        event_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<CommunityEvent>;

    /// `GET notifications?unreadOnly`.
    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> GatewayResult<Vec<Notification>>;

    /// `POST notifications/{id}/read`.
    async fn mark_notification_read(&self, notification_id: &str) -> GatewayResult<Notification>;

    /// `GET messages`.
    async fn list_messages(&self, user_id: &str) -> GatewayResult<Vec<DirectMessage>>;

    /// `POST chat`.
    async fn chat(&self, request: &ChatRequest) -> GatewayResult<ChatReply>;

    /// `POST chat/stream`. Events arrive on the receiver in order; the
    /// channel closes after the final event.
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> GatewayResult<mpsc::Receiver<ChatStreamEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_display() {
        assert_eq!(
            GatewayError::status(405, "method not allowed").to_string(),
            "HTTP 405: method not allowed"
        );
        assert_eq!(GatewayError::status(409, "held").status_code(), Some(409));
        assert!(GatewayError::Network("timeout".into()).is_network());
        assert!(!GatewayError::Decode("eof".into()).is_network());
    }
}
