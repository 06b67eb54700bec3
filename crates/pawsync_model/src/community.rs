//! Groups, invites, posts, events, notifications and direct messages.

use crate::error::{require, ModelResult};
use crate::ids::ClientRef;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The viewer's membership in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Not a member.
    #[default]
    None,
    /// Join request awaiting approval.
    Pending,
    /// Member.
    Member,
}

/// A community group as seen by the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group ID.
    pub id: String,
    /// Name.
    pub name: String,
    /// Suburb.
    pub suburb: String,
    /// Member count.
    #[serde(default)]
    pub member_count: u32,
    /// Official suburb group (open join).
    #[serde(default)]
    pub official: bool,
    /// Group admin.
    #[serde(default)]
    pub owner_user_id: Option<String>,
    /// Viewer's membership.
    #[serde(default)]
    pub membership_status: MembershipStatus,
    /// Viewer administers the group.
    #[serde(default)]
    pub is_admin: bool,
    /// Join requests awaiting the admin.
    #[serde(default)]
    pub pending_request_count: u32,
    /// Idempotency key of the creating write.
    #[serde(default)]
    pub client_ref: Option<ClientRef>,
}

/// Fields for creating a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDraft {
    /// Creating user.
    pub user_id: String,
    /// Name.
    pub name: String,
    /// Suburb.
    pub suburb: String,
    /// Idempotency key.
    pub client_ref: ClientRef,
}

impl GroupDraft {
    /// Checks required fields.
    pub fn validate(&self) -> ModelResult<()> {
        require("user_id", &self.user_id)?;
        require("name", &self.name)?;
        require("suburb", &self.suburb)
    }

    /// Client-only group shown until the server confirms the write.
    pub fn to_local_group(&self) -> Group {
        Group {
            id: self.client_ref.local_id(),
            name: self.name.trim().to_string(),
            suburb: self.suburb.trim().to_string(),
            member_count: 1,
            official: false,
            owner_user_id: Some(self.user_id.clone()),
            membership_status: MembershipStatus::Member,
            is_admin: true,
            pending_request_count: 0,
            client_ref: Some(self.client_ref),
        }
    }
}

/// A short-lived invite token resolving to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInvite {
    /// Opaque token.
    pub token: String,
    /// Target group.
    pub group_id: String,
    /// Target group name.
    pub group_name: String,
    /// Target group suburb.
    pub suburb: String,
    /// Inviting user.
    pub inviter_user_id: String,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Shareable URL.
    pub invite_url: String,
}

impl GroupInvite {
    /// Returns true once `now` has reached the expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Body of `POST onboarding/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingRequest {
    /// Invite being consumed.
    pub invite_token: String,
    /// New owner's name.
    pub owner_name: String,
    /// Dog's name.
    pub dog_name: String,
    /// Suburb override.
    #[serde(default)]
    pub suburb: Option<String>,
    /// Share the dog's photo with the group.
    #[serde(default)]
    pub share_photo_to_group: bool,
    /// Photo reference.
    #[serde(default)]
    pub photo_source: Option<String>,
}

impl OnboardingRequest {
    /// Checks required fields.
    pub fn validate(&self) -> ModelResult<()> {
        require("invite_token", &self.invite_token)?;
        require("owner_name", &self.owner_name)?;
        require("dog_name", &self.dog_name)
    }
}

/// Result of consuming an invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingResult {
    /// New or returning user.
    pub user_id: String,
    /// Joined group.
    pub group_id: String,
    /// Resulting membership.
    pub membership_status: MembershipStatus,
    /// Post created by sharing the photo.
    #[serde(default)]
    pub created_post_id: Option<String>,
}

/// Kind of community post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    /// Lost or found pet.
    LostFound,
    /// Ordinary group post.
    GroupPost,
}

/// A community post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPost {
    /// Post ID.
    pub id: String,
    /// Kind.
    pub kind: PostKind,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Suburb.
    pub suburb: String,
    /// Author.
    #[serde(default)]
    pub author_user_id: Option<String>,
    /// Group the post belongs to.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Pet featured in the post.
    #[serde(default)]
    pub pet_name: Option<String>,
    /// Photo of the pet.
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Idempotency key of the creating write.
    #[serde(default)]
    pub client_ref: Option<ClientRef>,
}

/// Fields for creating a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    /// Author.
    pub user_id: String,
    /// Kind.
    pub kind: PostKind,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Suburb.
    pub suburb: String,
    /// Group to post into.
    pub group_id: Option<String>,
    /// Featured pet.
    pub pet_name: Option<String>,
    /// Photo of the pet.
    pub photo_url: Option<String>,
    /// Idempotency key.
    pub client_ref: ClientRef,
}

impl PostDraft {
    /// Checks required fields.
    pub fn validate(&self) -> ModelResult<()> {
        require("user_id", &self.user_id)?;
        require("title", &self.title)?;
        require("suburb", &self.suburb)
    }

    /// Client-only post stamped at `now`.
    pub fn to_local_post(&self, now: DateTime<Utc>) -> CommunityPost {
        CommunityPost {
            id: self.client_ref.local_id(),
            kind: self.kind,
            title: self.title.trim().to_string(),
            body: self.body.trim().to_string(),
            suburb: self.suburb.trim().to_string(),
            author_user_id: Some(self.user_id.clone()),
            group_id: self.group_id.clone(),
            pet_name: self.pet_name.clone(),
            photo_url: self.photo_url.clone(),
            created_at: now,
            client_ref: Some(self.client_ref),
        }
    }
}

/// Approval state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Visible to everyone.
    #[default]
    Approved,
    /// Waiting for a group admin.
    PendingApproval,
}

/// The viewer's RSVP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    /// Not attending.
    #[default]
    None,
    /// Attending.
    Attending,
}

/// A community event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityEvent {
    /// Event ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Suburb.
    pub suburb: String,
    /// Date.
    pub date: NaiveDate,
    /// Hosting group.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Attendee count.
    #[serde(default)]
    pub attendee_count: u32,
    /// Creator.
    pub created_by: String,
    /// Viewer's RSVP.
    #[serde(default)]
    pub rsvp_status: RsvpStatus,
    /// Approval state.
    #[serde(default)]
    pub status: EventStatus,
    /// Idempotency key of the creating write.
    #[serde(default)]
    pub client_ref: Option<ClientRef>,
}

/// Fields for creating an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Creator.
    pub user_id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Suburb.
    pub suburb: String,
    /// Date.
    pub date: NaiveDate,
    /// Hosting group.
    pub group_id: Option<String>,
    /// Idempotency key.
    pub client_ref: ClientRef,
}

impl EventDraft {
    /// Checks required fields.
    pub fn validate(&self) -> ModelResult<()> {
        require("user_id", &self.user_id)?;
        require("title", &self.title)?;
        require("suburb", &self.suburb)
    }

    /// Client-only event. Group events start pending approval.
    pub fn to_local_event(&self) -> CommunityEvent {
        CommunityEvent {
            id: self.client_ref.local_id(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            suburb: self.suburb.trim().to_string(),
            date: self.date,
            group_id: self.group_id.clone(),
            attendee_count: 1,
            created_by: self.user_id.clone(),
            rsvp_status: RsvpStatus::Attending,
            status: if self.group_id.is_some() {
                EventStatus::PendingApproval
            } else {
                EventStatus::Approved
            },
            client_ref: Some(self.client_ref),
        }
    }
}

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// Booking updates.
    Booking,
    /// Direct messages.
    Message,
    /// Community activity.
    Community,
    /// Everything else.
    #[default]
    System,
}

/// An in-app notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID.
    pub id: String,
    /// Recipient.
    pub user_id: String,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Category.
    #[serde(default)]
    pub category: NotificationCategory,
    /// Read flag.
    #[serde(default)]
    pub read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// In-app link.
    #[serde(default)]
    pub deep_link: Option<String>,
}

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Message ID.
    pub id: String,
    /// Sender.
    pub sender_user_id: String,
    /// Recipient.
    pub recipient_user_id: String,
    /// Text.
    pub body: String,
    /// Send time.
    pub sent_at: DateTime<Utc>,
    /// Whether the recipient has read it.
    #[serde(default)]
    pub read: bool,
}

impl DirectMessage {
    /// The other participant from `user_id`'s point of view.
    pub fn counterparty_of(&self, user_id: &str) -> Option<&str> {
        if self.sender_user_id == user_id {
            Some(&self.recipient_user_id)
        } else if self.recipient_user_id == user_id {
            Some(&self.sender_user_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn group_draft_becomes_admin_membership() {
        let draft = GroupDraft {
            user_id: "user_1".into(),
            name: "Bark Park".into(),
            suburb: "Glebe".into(),
            client_ref: ClientRef::new(),
        };
        let group = draft.to_local_group();
        assert!(group.is_admin);
        assert_eq!(group.membership_status, MembershipStatus::Member);
        assert_eq!(group.client_ref, Some(draft.client_ref));
    }

    #[test]
    fn group_event_starts_pending() {
        let draft = EventDraft {
            user_id: "user_1".into(),
            title: "Sunday pack walk".into(),
            description: String::new(),
            suburb: "Glebe".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(),
            group_id: Some("g1".into()),
            client_ref: ClientRef::new(),
        };
        assert_eq!(draft.to_local_event().status, EventStatus::PendingApproval);
    }

    #[test]
    fn invite_expiry() {
        let now = Utc::now();
        let invite = GroupInvite {
            token: "tok".into(),
            group_id: "g1".into(),
            group_name: "Glebe Dogs".into(),
            suburb: "Glebe".into(),
            inviter_user_id: "user_1".into(),
            expires_at: now + Duration::hours(48),
            invite_url: "https://pawsync.app/invite/tok".into(),
        };
        assert!(!invite.is_expired(now));
        assert!(invite.is_expired(now + Duration::hours(48)));
    }

    #[test]
    fn onboarding_requires_names() {
        let request = OnboardingRequest {
            invite_token: "tok".into(),
            owner_name: "Sam".into(),
            dog_name: "".into(),
            suburb: None,
            share_photo_to_group: true,
            photo_source: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn counterparty_lookup() {
        let message = DirectMessage {
            id: "m1".into(),
            sender_user_id: "user_1".into(),
            recipient_user_id: "user_2".into(),
            body: "hi".into(),
            sent_at: Utc::now(),
            read: false,
        };
        assert_eq!(message.counterparty_of("user_1"), Some("user_2"));
        assert_eq!(message.counterparty_of("user_2"), Some("user_1"));
        assert_eq!(message.counterparty_of("user_3"), None);
    }
}
