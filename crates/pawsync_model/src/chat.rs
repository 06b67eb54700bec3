//! Assistant chat wire types and suggested UI actions.

use crate::error::{ModelError, ModelResult};
use crate::provider::Category;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Body of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation the message belongs to.
    pub conversation_id: String,
    /// Sending user.
    pub user_id: String,
    /// Message text.
    pub message: String,
    /// Suburb hint.
    #[serde(default)]
    pub suburb: Option<String>,
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// The app user.
    User,
    /// The assistant.
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Speaker.
    pub role: ChatRole,
    /// Text.
    pub content: String,
}

/// A suggested action chip exactly as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtaChip {
    /// Button label.
    pub label: String,
    /// Action kind.
    pub action: String,
    /// Untyped payload.
    #[serde(default)]
    pub payload: Value,
}

/// A complete assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Answer text.
    pub answer: String,
    /// Suggested actions.
    #[serde(default)]
    pub cta_chips: Vec<CtaChip>,
    /// Conversation so far, as the server sees it.
    #[serde(default)]
    pub conversation: Vec<ChatTurn>,
}

impl ChatReply {
    /// Decodes the suggested actions, dropping kinds this client does not know.
    pub fn actions(&self) -> Vec<(String, UiAction)> {
        self.cta_chips
            .iter()
            .filter_map(|chip| match UiAction::decode(chip) {
                Ok(action) => Some((chip.label.clone(), action)),
                Err(e) => {
                    warn!(action = %chip.action, error = %e, "dropping suggested action");
                    None
                }
            })
            .collect()
    }
}

/// One event of a streamed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Incremental text.
    Delta {
        /// Text to append.
        delta: String,
    },
    /// The finished reply.
    Final {
        /// Complete reply.
        response: ChatReply,
    },
}

/// Suggested UI action, decoded once from a [`CtaChip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum UiAction {
    /// Open the services tab.
    OpenServices {
        /// Category to preselect.
        #[serde(default)]
        category: Option<Category>,
        /// Suburb to preselect.
        #[serde(default)]
        suburb: Option<String>,
    },
    /// Open the community tab.
    OpenCommunity {
        /// Suburb to preselect.
        #[serde(default)]
        suburb: Option<String>,
    },
    /// Start a lost/found post.
    CreateLostFound {
        /// Suggested title.
        #[serde(default)]
        title: Option<String>,
        /// Suburb.
        #[serde(default)]
        suburb: Option<String>,
        /// Pet name.
        #[serde(default)]
        pet_name: Option<String>,
    },
    /// Search dog walkers.
    FindDogWalkers {
        /// Suburb.
        #[serde(default)]
        suburb: Option<String>,
    },
    /// Search groomers.
    FindGroomers {
        /// Suburb.
        #[serde(default)]
        suburb: Option<String>,
    },
    /// Accept the suggested pet profile.
    AcceptProfileCard {
        /// Pet name.
        #[serde(default)]
        pet_name: Option<String>,
    },
    /// Submit a provider listing drafted in chat.
    SubmitProviderListing {
        /// Listing name.
        #[serde(default)]
        name: Option<String>,
        /// Category.
        #[serde(default)]
        category: Option<Category>,
        /// Suburb.
        #[serde(default)]
        suburb: Option<String>,
        /// Description.
        #[serde(default)]
        description: Option<String>,
        /// Starting price.
        #[serde(default)]
        price_from: Option<u32>,
    },
    /// Join a group.
    JoinGroup {
        /// Group to join.
        group_id: String,
    },
}

impl UiAction {
    /// Decodes a wire chip into a typed action.
    pub fn decode(chip: &CtaChip) -> ModelResult<Self> {
        let payload = match &chip.payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let tagged = serde_json::json!({ "action": chip.action, "payload": payload });
        serde_json::from_value(tagged).map_err(|e| ModelError::InvalidAction(e.to_string()))
    }

    /// Category a search-style action implies.
    pub fn implied_category(&self) -> Option<Category> {
        match self {
            UiAction::OpenServices { category, .. } => *category,
            UiAction::FindDogWalkers { .. } => Some(Category::DogWalking),
            UiAction::FindGroomers { .. } => Some(Category::Grooming),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chip(action: &str, payload: Value) -> CtaChip {
        CtaChip {
            label: "Go".into(),
            action: action.into(),
            payload,
        }
    }

    #[test]
    fn decode_typed_payload() {
        let chip = chip("find_groomers", json!({"suburb": "Newtown"}));
        let action = UiAction::decode(&chip).unwrap();
        assert_eq!(
            action,
            UiAction::FindGroomers {
                suburb: Some("Newtown".into())
            }
        );
        assert_eq!(action.implied_category(), Some(Category::Grooming));
    }

    #[test]
    fn decode_empty_payload() {
        let action = UiAction::decode(&chip("open_community", Value::Null)).unwrap();
        assert_eq!(action, UiAction::OpenCommunity { suburb: None });
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        assert!(UiAction::decode(&chip("launch_rocket", json!({}))).is_err());
    }

    #[test]
    fn join_group_requires_id() {
        assert!(UiAction::decode(&chip("join_group", json!({}))).is_err());
        assert_eq!(
            UiAction::decode(&chip("join_group", json!({"group_id": "g1"}))).unwrap(),
            UiAction::JoinGroup {
                group_id: "g1".into()
            }
        );
    }

    #[test]
    fn reply_drops_unknown_actions() {
        let reply = ChatReply {
            answer: "Here are some walkers".into(),
            cta_chips: vec![
                chip("find_dog_walkers", json!({})),
                chip("mystery", json!({})),
            ],
            conversation: vec![],
        };
        let actions = reply.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].1, UiAction::FindDogWalkers { suburb: None });
    }

    #[test]
    fn stream_event_wire_shape() {
        let event: ChatStreamEvent =
            serde_json::from_value(json!({"type": "delta", "delta": "Hel"})).unwrap();
        assert_eq!(
            event,
            ChatStreamEvent::Delta {
                delta: "Hel".into()
            }
        );
    }
}
