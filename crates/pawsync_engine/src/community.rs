//! Groups, invites, posts, events and notifications.

use crate::buffer::{Committed, MutationBuffer, PendingWrite};
use crate::error::{EngineError, EngineResult};
use crate::gateway::Gateway;
use crate::store::StateStore;
use pawsync_model::{
    ClientRef, CommunityEvent, CommunityPost, EventDraft, EventStatus, Group, GroupDraft,
    GroupInvite, HomeSnapshot, Notification, OnboardingRequest, OnboardingResult, PostDraft,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Community operations of the signed-in user.
pub struct Community {
    gateway: Arc<dyn Gateway>,
    store: Arc<StateStore>,
    buffer: Arc<MutationBuffer>,
}

impl Community {
    /// Creates the service.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: Arc<StateStore>,
        buffer: Arc<MutationBuffer>,
    ) -> Self {
        Self {
            gateway,
            store,
            buffer,
        }
    }

    /// Joins a group. Official groups admit immediately; others leave the
    /// membership pending approval.
    pub async fn join_group(&self, group_id: &str, user_id: &str) -> EngineResult<Group> {
        let write = PendingWrite::JoinGroup {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            client_ref: ClientRef::new(),
        };
        let group = self
            .change(
                write,
                |snapshot| snapshot.groups.iter().find(|g| g.id == group_id).cloned(),
                async {
                    self.gateway
                        .join_group(group_id, user_id)
                        .await
                        .map_err(EngineError::from)
                },
                upsert_group,
            )
            .await?;
        info!(group = group_id, membership = ?group.membership_status, "joined group");
        Ok(group)
    }

    /// Creates a group, buffered when the write qualifies.
    pub async fn create_group(&self, draft: GroupDraft) -> EngineResult<Committed<Group>> {
        draft.validate()?;
        let local = draft.to_local_group();
        let write = PendingWrite::Group(draft.clone());
        let committed = self
            .buffer
            .submit(write.clone(), local, async {
                self.gateway.create_group(&draft).await.map_err(EngineError::from)
            })
            .await?;
        self.commit(&write, &committed, upsert_group);
        Ok(committed)
    }

    /// Creates an invite link for a group.
    pub async fn create_invite(
        &self,
        group_id: &str,
        inviter_user_id: &str,
    ) -> EngineResult<GroupInvite> {
        let invite = self
            .gateway
            .create_invite(group_id, inviter_user_id)
            .await
            .map_err(EngineError::from)?;
        info!(group = group_id, expires_at = %invite.expires_at, "invite created");
        Ok(invite)
    }

    /// Looks up an invite. Expired invites are rejected even if the remote
    /// side still returns them.
    pub async fn resolve_invite(&self, token: &str) -> EngineResult<GroupInvite> {
        let invite = self
            .gateway
            .resolve_invite(token)
            .await
            .map_err(EngineError::from)?;
        if invite.is_expired(self.store.now()) {
            warn!(group = %invite.group_id, "invite expired");
            return Err(EngineError::InviteExpired);
        }
        Ok(invite)
    }

    /// Consumes an invite and joins its group.
    pub async fn complete_onboarding(
        &self,
        request: OnboardingRequest,
    ) -> EngineResult<OnboardingResult> {
        request.validate()?;
        self.resolve_invite(&request.invite_token).await?;
        let result = self
            .gateway
            .complete_onboarding(&request)
            .await
            .map_err(EngineError::from)?;
        info!(
            user = %result.user_id,
            group = %result.group_id,
            shared_post = ?result.created_post_id,
            "onboarding complete"
        );
        Ok(result)
    }

    /// Publishes a post, buffered when the write qualifies. Posts naming a
    /// pet feed the roster.
    pub async fn create_post(&self, draft: PostDraft) -> EngineResult<Committed<CommunityPost>> {
        draft.validate()?;
        let recorded_at = self.store.now();
        let local = draft.to_local_post(recorded_at);
        let write = PendingWrite::Post {
            draft: draft.clone(),
            recorded_at,
        };
        let committed = self
            .buffer
            .submit(write.clone(), local, async {
                self.gateway.create_post(&draft).await.map_err(EngineError::from)
            })
            .await?;
        self.commit(&write, &committed, |snapshot, post| {
            match snapshot.posts.iter_mut().find(|p| p.id == post.id) {
                Some(slot) => *slot = post,
                None => snapshot.posts.insert(0, post),
            }
        });
        Ok(committed)
    }

    /// Creates an event, buffered when the write qualifies.
    pub async fn create_event(&self, draft: EventDraft) -> EngineResult<Committed<CommunityEvent>> {
        draft.validate()?;
        let local = draft.to_local_event();
        let write = PendingWrite::Event(draft.clone());
        let committed = self
            .buffer
            .submit(write.clone(), local, async {
                self.gateway.create_event(&draft).await.map_err(EngineError::from)
            })
            .await?;
        self.commit(&write, &committed, upsert_event);
        Ok(committed)
    }

    /// Marks the user as attending an event.
    pub async fn rsvp_event(&self, event_id: &str, user_id: &str) -> EngineResult<CommunityEvent> {
        let write = PendingWrite::Rsvp {
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            client_ref: ClientRef::new(),
        };
        self.change(
            write,
            |snapshot| find_event(snapshot, event_id),
            async {
                self.gateway
                    .rsvp_event(event_id, user_id)
                    .await
                    .map_err(EngineError::from)
            },
            upsert_event,
        )
        .await
    }

    /// Approves an event waiting for an admin.
    pub async fn approve_event(
        &self,
        event_id: &str,
        actor_user_id: &str,
    ) -> EngineResult<CommunityEvent> {
        let pending = self
            .store
            .select(|state| find_event(&state.snapshot, event_id).map(|e| e.status));
        if pending == Some(EventStatus::Approved) {
            return Err(EngineError::InvalidTransition {
                from: "approved".into(),
                to: "approved".into(),
            });
        }
        let write = PendingWrite::ApproveEvent {
            event_id: event_id.to_string(),
            actor_user_id: actor_user_id.to_string(),
            client_ref: ClientRef::new(),
        };
        let event = self
            .change(
                write,
                |snapshot| find_event(snapshot, event_id),
                async {
                    self.gateway
                        .approve_event(event_id, actor_user_id)
                        .await
                        .map_err(EngineError::from)
                },
                upsert_event,
            )
            .await?;
        info!(event = event_id, "event approved");
        Ok(event)
    }

    /// Fetches notifications, optionally only unread ones.
    pub async fn notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> EngineResult<Vec<Notification>> {
        self.gateway
            .list_notifications(user_id, unread_only)
            .await
            .map_err(EngineError::from)
    }

    /// Marks one notification read.
    pub async fn mark_notification_read(
        &self,
        notification_id: &str,
    ) -> EngineResult<Notification> {
        let notification = self
            .gateway
            .mark_notification_read(notification_id)
            .await
            .map_err(EngineError::from)?;
        let stored = notification.clone();
        self.store.mutate(|state| {
            if let Some(slot) = state
                .snapshot
                .notifications
                .iter_mut()
                .find(|n| n.id == stored.id)
            {
                *slot = stored;
            }
        });
        Ok(notification)
    }

    /// Runs a change to an existing entity through the buffer. `pick`
    /// finds the entity in view; without one there is nothing to show
    /// locally and the remote result is taken as is.
    async fn change<T: Clone>(
        &self,
        write: PendingWrite,
        pick: impl FnOnce(&HomeSnapshot) -> Option<T>,
        remote: impl Future<Output = EngineResult<T>>,
        fold: impl FnOnce(&mut HomeSnapshot, T),
    ) -> EngineResult<T> {
        let local = self
            .store
            .select(|state| write.preview(&state.snapshot, pick));
        let committed = match local {
            Some(local) => self.buffer.submit(write.clone(), local, remote).await?,
            None => Committed::Remote(remote.await?),
        };
        self.commit(&write, &committed, fold);
        Ok(committed.into_inner())
    }

    /// Folds a committed write into the published snapshot. A local commit
    /// goes through the buffered write so the entity looks the same as it
    /// will after every later overlay.
    fn commit<T: Clone>(
        &self,
        write: &PendingWrite,
        committed: &Committed<T>,
        insert: impl FnOnce(&mut HomeSnapshot, T),
    ) {
        let entity = committed.entity().clone();
        let is_local = committed.is_local();
        self.store.mutate(|state| {
            if is_local {
                write.apply_to(&mut state.snapshot);
                state.pending_sync = true;
            } else {
                insert(&mut state.snapshot, entity);
            }
        });
    }
}

fn upsert_group(snapshot: &mut HomeSnapshot, group: Group) {
    match snapshot.groups.iter_mut().find(|g| g.id == group.id) {
        Some(slot) => *slot = group,
        None => snapshot.groups.push(group),
    }
}

fn find_event(snapshot: &HomeSnapshot, event_id: &str) -> Option<CommunityEvent> {
    snapshot.events.iter().find(|e| e.id == event_id).cloned()
}

fn upsert_event(snapshot: &mut HomeSnapshot, event: CommunityEvent) {
    match snapshot.events.iter_mut().find(|e| e.id == event.id) {
        Some(slot) => *slot = event,
        None => snapshot.events.push(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pawsync_model::{MembershipStatus, RsvpStatus};

    fn group(id: &str, members: u32) -> Group {
        Group {
            id: id.into(),
            name: "Newtown Dogs".into(),
            suburb: "Newtown".into(),
            member_count: members,
            official: true,
            owner_user_id: None,
            membership_status: MembershipStatus::None,
            is_admin: false,
            pending_request_count: 0,
            client_ref: None,
        }
    }

    #[test]
    fn upsert_group_replaces_by_id() {
        let mut snapshot = HomeSnapshot::default();
        upsert_group(&mut snapshot, group("g1", 10));
        upsert_group(&mut snapshot, group("g1", 11));
        upsert_group(&mut snapshot, group("g2", 3));
        assert_eq!(snapshot.groups.len(), 2);
        assert_eq!(snapshot.groups[0].member_count, 11);
    }

    #[test]
    fn upsert_event_keeps_order() {
        let draft = EventDraft {
            user_id: "user_2".into(),
            title: "Beach meetup".into(),
            description: String::new(),
            suburb: "Bondi".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 7).unwrap(),
            group_id: None,
            client_ref: ClientRef::new(),
        };
        let mut snapshot = HomeSnapshot::default();
        let mut event = draft.to_local_event();
        upsert_event(&mut snapshot, event.clone());
        event.rsvp_status = RsvpStatus::Attending;
        upsert_event(&mut snapshot, event);
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].rsvp_status, RsvpStatus::Attending);
    }
}
