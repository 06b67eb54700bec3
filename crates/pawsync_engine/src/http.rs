//! JSON-over-HTTP gateway implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so hosts can plug
//! in whichever HTTP library they ship with. [`HttpGateway`] only builds
//! paths, encodes bodies as JSON and classifies responses.

use crate::gateway::{Gateway, GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use pawsync_model::{
    AvailabilitySlot, Booking, BookingHold, BookingRequest, BookingStatusUpdate, CalendarEvent,
    CalendarRole, ChatReply, ChatRequest, ChatStreamEvent, CommunityEvent, CommunityPost,
    DirectMessage, EventDraft, Group, GroupDraft, GroupInvite, HoldRequest, Notification,
    OnboardingRequest, OnboardingResult, PostDraft, Provider, ProviderDraft, ProviderQuery,
    ProviderUpdate, QuoteBundle, QuoteDraft, QuoteResponse, QuoteTarget,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

/// A request handed to the [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL without the query string.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// JSON body for POST requests.
    pub body: Option<Vec<u8>>,
}

/// A response returned by the [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Return `Err` only when no response was received; any status code,
/// including errors, is an `Ok` response.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// [`Gateway`] speaking JSON over an [`HttpClient`].
pub struct HttpGateway<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpGateway<C> {
    /// Creates a gateway rooted at `base_url` (e.g. `https://api.example.com/v1`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> GatewayResult<Vec<u8>> {
        let request = HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            query,
            body,
        };
        debug!(method = ?request.method, url = %request.url, "gateway request");
        let response = self
            .client
            .send(request)
            .await
            .map_err(GatewayError::Network)?;
        if (200..300).contains(&response.status) {
            Ok(response.body)
        } else {
            Err(GatewayError::Status {
                status: response.status,
                message: error_detail(&response.body),
            })
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> GatewayResult<T> {
        let body = self.execute(Method::Get, path, query, None).await?;
        decode(&body)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<T> {
        let encoded =
            serde_json::to_vec(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let body = self
            .execute(Method::Post, path, Vec::new(), Some(encoded))
            .await?;
        decode(&body)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> GatewayResult<T> {
    serde_json::from_slice(body).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Extracts `detail` from a JSON error body, falling back to the raw text.
fn error_detail(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

fn pairs(items: &[(&str, String)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[async_trait]
impl<C: HttpClient> Gateway for HttpGateway<C> {
    async fn list_providers(&self, query: &ProviderQuery) -> GatewayResult<Vec<Provider>> {
        let query = query
            .to_query_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.get("/providers", query).await
    }

    async fn create_provider(&self, draft: &ProviderDraft) -> GatewayResult<Provider> {
        self.post("/providers", draft).await
    }

    async fn update_provider(
        &self,
        provider_id: &str,
        update: &ProviderUpdate,
    ) -> GatewayResult<Provider> {
        self.post(&format!("/providers/{provider_id}/update"), update)
            .await
    }

    async fn cancel_provider(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<Provider> {
        self.post(
            &format!("/providers/{provider_id}/cancel"),
            &json!({ "actor_user_id": actor_user_id }),
        )
        .await
    }

    async fn restore_provider(
        &self,
        provider_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<Provider> {
        self.post(
            &format!("/providers/{provider_id}/restore"),
            &json!({ "actor_user_id": actor_user_id }),
        )
        .await
    }

    async fn availability(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> GatewayResult<Vec<AvailabilitySlot>> {
        self.get(
            &format!("/providers/{provider_id}/availability"),
            pairs(&[("date", date.to_string())]),
        )
        .await
    }

    async fn create_hold(&self, request: &HoldRequest) -> GatewayResult<BookingHold> {
        self.post("/bookings/holds", request).await
    }

    async fn create_booking(&self, request: &BookingRequest) -> GatewayResult<Booking> {
        self.post("/bookings", request).await
    }

    async fn update_booking_status(
        &self,
        booking_id: &str,
        update: &BookingStatusUpdate,
    ) -> GatewayResult<Booking> {
        self.post(&format!("/bookings/{booking_id}/status"), update)
            .await
    }

    async fn list_bookings(
        &self,
        user_id: &str,
        role: CalendarRole,
    ) -> GatewayResult<Vec<Booking>> {
        self.get(
            "/bookings",
            pairs(&[
                ("userId", user_id.to_string()),
                ("role", role.as_str().to_string()),
            ]),
        )
        .await
    }

    async fn calendar_events(
        &self,
        user_id: &str,
        role: CalendarRole,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> GatewayResult<Vec<CalendarEvent>> {
        self.get(
            "/calendar/events",
            pairs(&[
                ("userId", user_id.to_string()),
                ("role", role.as_str().to_string()),
                ("dateFrom", date_from.to_string()),
                ("dateTo", date_to.to_string()),
            ]),
        )
        .await
    }

    async fn create_quote(&self, draft: &QuoteDraft) -> GatewayResult<QuoteBundle> {
        self.post("/quotes", draft).await
    }

    async fn respond_quote_target(
        &self,
        target_id: &str,
        response: &QuoteResponse,
    ) -> GatewayResult<QuoteTarget> {
        self.post(&format!("/quotes/targets/{target_id}/respond"), response)
            .await
    }

    async fn list_quotes(&self, user_id: &str) -> GatewayResult<Vec<QuoteBundle>> {
        self.get("/quotes", pairs(&[("userId", user_id.to_string())]))
            .await
    }

    async fn list_groups(&self, user_id: &str) -> GatewayResult<Vec<Group>> {
        self.get("/groups", pairs(&[("userId", user_id.to_string())]))
            .await
    }

    async fn create_group(&self, draft: &GroupDraft) -> GatewayResult<Group> {
        self.post("/groups", draft).await
    }

    async fn join_group(&self, group_id: &str, user_id: &str) -> GatewayResult<Group> {
        self.post(
            &format!("/groups/{group_id}/join"),
            &json!({ "user_id": user_id }),
        )
        .await
    }

    async fn create_invite(
        &self,
        group_id: &str,
        inviter_user_id: &str,
    ) -> GatewayResult<GroupInvite> {
        self.post(
            "/invites",
            &json!({ "group_id": group_id, "inviter_user_id": inviter_user_id }),
        )
        .await
    }

    async fn resolve_invite(&self, token: &str) -> GatewayResult<GroupInvite> {
        self.get(&format!("/invites/{token}"), Vec::new()).await
    }

    async fn complete_onboarding(
        &self,
        request: &OnboardingRequest,
    ) -> GatewayResult<OnboardingResult> {
        self.post("/onboarding/complete", request).await
    }

    async fn list_posts(&self, suburb: Option<&str>) -> GatewayResult<Vec<CommunityPost>> {
        let query = suburb
            .map(|s| vec![("suburb".to_string(), s.to_string())])
            .unwrap_or_default();
        self.get("/posts", query).await
    }

    async fn create_post(&self, draft: &PostDraft) -> GatewayResult<CommunityPost> {
        self.post("/posts", draft).await
    }

    async fn list_events(
        &self,
        user_id: Option<&str>,
        suburb: Option<&str>,
    ) -> GatewayResult<Vec<CommunityEvent>> {
        let mut query = Vec::new();
        if let Some(user_id) = user_id {
            query.push(("userId".to_string(), user_id.to_string()));
        }
        if let Some(suburb) = suburb {
            query.push(("suburb".to_string(), suburb.to_string()));
        }
        self.get("/events", query).await
    }

    async fn create_event(&self, draft: &EventDraft) -> GatewayResult<CommunityEvent> {
        self.post("/events", draft).await
    }

    async fn rsvp_event(&self, event_id: &str, user_id: &str) -> GatewayResult<CommunityEvent> {
        self.post(
            &format!("/events/{event_id}/rsvp"),
            &json!({ "user_id": user_id }),
        )
        .await
    }

    async fn approve_event(
        &self,
        event_id: &str,
        actor_user_id: &str,
    ) -> GatewayResult<CommunityEvent> {
        self.post(
            &format!("/events/{event_id}/approve"),
            &json!({ "actor_user_id": actor_user_id }),
        )
        .await
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> GatewayResult<Vec<Notification>> {
        self.get(
            "/notifications",
            pairs(&[
                ("userId", user_id.to_string()),
                ("unreadOnly", unread_only.to_string()),
            ]),
        )
        .await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> GatewayResult<Notification> {
        self.post(
            &format!("/notifications/{notification_id}/read"),
            &json!({}),
        )
        .await
    }

    async fn list_messages(&self, user_id: &str) -> GatewayResult<Vec<DirectMessage>> {
        self.get("/messages", pairs(&[("userId", user_id.to_string())]))
            .await
    }

    async fn chat(&self, request: &ChatRequest) -> GatewayResult<ChatReply> {
        self.post("/chat", request).await
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> GatewayResult<mpsc::Receiver<ChatStreamEvent>> {
        let encoded =
            serde_json::to_vec(request).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let body = self
            .execute(Method::Post, "/chat/stream", Vec::new(), Some(encoded))
            .await?;
        let events = decode_stream(&body)?;
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(rx)
    }
}

/// Decodes a newline-delimited stream body. Lines may carry an SSE
/// `data:` prefix; blank lines are skipped.
fn decode_stream(body: &[u8]) -> GatewayResult<Vec<ChatStreamEvent>> {
    let text = std::str::from_utf8(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
    text.lines()
        .map(str::trim)
        .map(|line| line.strip_prefix("data:").map(str::trim).unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| decode(line.as_bytes()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pawsync_model::{Category, SortBy};

    struct ScriptedClient {
        status: u16,
        body: Vec<u8>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedClient {
        fn new(status: u16, body: &str) -> Self {
            Self {
                status,
                body: body.as_bytes().to_vec(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.seen.lock().push(request);
            Ok(HttpResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    struct DownClient;

    #[async_trait]
    impl HttpClient for DownClient {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, String> {
            Err("connection refused".into())
        }
    }

    #[tokio::test]
    async fn provider_query_string() {
        let gateway = HttpGateway::new("https://api.test/", ScriptedClient::new(200, "[]"));
        let query = ProviderQuery {
            category: Some(Category::DogWalking),
            suburb: Some("Newtown".into()),
            sort_by: SortBy::Rating,
            ..Default::default()
        };
        let providers = gateway.list_providers(&query).await.unwrap();
        assert!(providers.is_empty());

        let seen = gateway.client.seen.lock();
        assert_eq!(seen[0].url, "https://api.test/providers");
        assert_eq!(seen[0].method, Method::Get);
        assert!(seen[0]
            .query
            .contains(&("category".to_string(), "dog_walking".to_string())));
        assert!(seen[0]
            .query
            .contains(&("sortBy".to_string(), "rating".to_string())));
    }

    #[tokio::test]
    async fn error_status_carries_detail() {
        let gateway = HttpGateway::new(
            "https://api.test",
            ScriptedClient::new(405, r#"{"detail":"Method Not Allowed"}"#),
        );
        let err = gateway.resolve_invite("tok").await.unwrap_err();
        assert_eq!(err, GatewayError::status(405, "Method Not Allowed"));
    }

    #[tokio::test]
    async fn transport_failure_is_network() {
        let gateway = HttpGateway::new("https://api.test", DownClient);
        let err = gateway.list_groups("user_1").await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn undecodable_body() {
        let gateway = HttpGateway::new("https://api.test", ScriptedClient::new(200, "<html>"));
        let err = gateway.list_messages("user_1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn stream_events_in_order() {
        let body = concat!(
            "data: {\"type\":\"delta\",\"delta\":\"Hi \"}\n\n",
            "data: {\"type\":\"delta\",\"delta\":\"there\"}\n\n",
            "data: {\"type\":\"final\",\"response\":{\"answer\":\"Hi there\"}}\n"
        );
        let gateway = HttpGateway::new("https://api.test", ScriptedClient::new(200, body));
        let request = ChatRequest {
            conversation_id: "c1".into(),
            user_id: "user_1".into(),
            message: "hello".into(),
            suburb: None,
        };
        let mut rx = gateway.stream_chat(&request).await.unwrap();
        let mut deltas = String::new();
        let mut final_answer = None;
        while let Some(event) = rx.recv().await {
            match event {
                ChatStreamEvent::Delta { delta } => deltas.push_str(&delta),
                ChatStreamEvent::Final { response } => final_answer = Some(response.answer),
            }
        }
        assert_eq!(deltas, "Hi there");
        assert_eq!(final_answer.as_deref(), Some("Hi there"));
    }

    #[test]
    fn plain_text_error_detail() {
        assert_eq!(error_detail(b" gateway timeout \n"), "gateway timeout");
    }
}
