//! Quote requests fanned out to several providers.

use crate::error::{require, ModelResult};
use crate::provider::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate status of a quote request, derived from its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteRequestStatus {
    /// No target has answered.
    #[default]
    Pending,
    /// At least one target answered.
    Responded,
    /// Every target declined, or there were no targets.
    Closed,
}

impl QuoteRequestStatus {
    /// Derives the aggregate status from target statuses.
    pub fn derive<'a>(targets: impl IntoIterator<Item = &'a QuoteTarget>) -> Self {
        let mut any = false;
        let mut any_answered = false;
        let mut all_declined = true;
        for target in targets {
            any = true;
            match target.status {
                QuoteTargetStatus::Pending => all_declined = false,
                QuoteTargetStatus::Accepted => {
                    any_answered = true;
                    all_declined = false;
                }
                QuoteTargetStatus::Declined => any_answered = true,
            }
        }
        if !any || all_declined {
            QuoteRequestStatus::Closed
        } else if any_answered {
            QuoteRequestStatus::Responded
        } else {
            QuoteRequestStatus::Pending
        }
    }
}

/// A pet owner's request for quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Request ID.
    pub id: String,
    /// Requesting pet owner.
    pub owner_user_id: String,
    /// Service category.
    pub category: Category,
    /// Suburb.
    pub suburb: String,
    /// Preferred time window, free text.
    pub preferred_window: String,
    /// Pet details, free text.
    pub pet_details: String,
    /// Extra note.
    #[serde(default)]
    pub note: String,
    /// Aggregate status.
    #[serde(default)]
    pub status: QuoteRequestStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Response state of one provider within a quote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteTargetStatus {
    /// Not answered yet.
    #[default]
    Pending,
    /// Provider accepted.
    Accepted,
    /// Provider declined.
    Declined,
}

/// A provider's decision on a quote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteDecision {
    /// Accept the request.
    Accepted,
    /// Decline the request.
    Declined,
}

impl From<QuoteDecision> for QuoteTargetStatus {
    fn from(decision: QuoteDecision) -> Self {
        match decision {
            QuoteDecision::Accepted => QuoteTargetStatus::Accepted,
            QuoteDecision::Declined => QuoteTargetStatus::Declined,
        }
    }
}

/// Highest reminder already sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    /// No reminder sent.
    None,
    /// The 15 minute reminder went out.
    FifteenMinutes,
    /// The 60 minute reminder went out.
    SixtyMinutes,
}

/// One provider's independent slot within a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTarget {
    /// Target ID.
    pub id: String,
    /// Parent request.
    pub quote_request_id: String,
    /// Targeted provider.
    pub provider_id: String,
    /// User who owns the targeted provider.
    pub provider_owner_user_id: String,
    /// Response state.
    #[serde(default)]
    pub status: QuoteTargetStatus,
    /// Provider's message.
    #[serde(default)]
    pub response_message: String,
    /// When the target was created.
    pub created_at: DateTime<Utc>,
    /// When the provider answered.
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    /// 15 minute reminder sent (never reset).
    #[serde(default)]
    pub reminder_15_sent: bool,
    /// 60 minute reminder sent (never reset).
    #[serde(default)]
    pub reminder_60_sent: bool,
}

impl QuoteTarget {
    /// Returns true once the provider has answered.
    pub fn is_answered(&self) -> bool {
        self.status != QuoteTargetStatus::Pending
    }

    /// Highest reminder recorded on this target.
    pub fn reminder_stage(&self) -> ReminderStage {
        if self.reminder_60_sent {
            ReminderStage::SixtyMinutes
        } else if self.reminder_15_sent {
            ReminderStage::FifteenMinutes
        } else {
            ReminderStage::None
        }
    }

    /// Keeps reminder flags already observed on an earlier copy of this target.
    pub fn absorb_reminders(&mut self, earlier: &QuoteTarget) {
        self.reminder_15_sent |= earlier.reminder_15_sent;
        self.reminder_60_sent |= earlier.reminder_60_sent;
    }
}

/// A quote request together with its targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteBundle {
    /// The request.
    #[serde(rename = "quoteRequest", alias = "quote_request")]
    pub request: QuoteRequest,
    /// One target per matched provider.
    pub targets: Vec<QuoteTarget>,
}

impl QuoteBundle {
    /// Finds a target by ID.
    pub fn target(&self, target_id: &str) -> Option<&QuoteTarget> {
        self.targets.iter().find(|t| t.id == target_id)
    }

    /// Replaces one target and refreshes the aggregate status. Sibling
    /// targets are left untouched.
    pub fn replace_target(&mut self, mut updated: QuoteTarget) -> bool {
        let Some(slot) = self.targets.iter_mut().find(|t| t.id == updated.id) else {
            return false;
        };
        updated.absorb_reminders(slot);
        *slot = updated;
        self.request.status = QuoteRequestStatus::derive(&self.targets);
        true
    }
}

/// Body of `POST quotes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDraft {
    /// Requesting user.
    pub user_id: String,
    /// Service category.
    pub category: Category,
    /// Suburb.
    pub suburb: String,
    /// Preferred time window.
    pub preferred_window: String,
    /// Pet details.
    pub pet_details: String,
    /// Extra note.
    pub note: String,
}

impl QuoteDraft {
    /// Checks required fields.
    pub fn validate(&self) -> ModelResult<()> {
        require("user_id", &self.user_id)?;
        require("suburb", &self.suburb)?;
        require("preferred_window", &self.preferred_window)?;
        require("pet_details", &self.pet_details)?;
        Ok(())
    }
}

/// Body of `POST quotes/targets/{id}/respond`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteResponse {
    /// Acting user; must own the targeted provider.
    pub actor_user_id: String,
    /// Decision.
    pub decision: QuoteDecision,
    /// Message to the requester.
    pub message: String,
}
