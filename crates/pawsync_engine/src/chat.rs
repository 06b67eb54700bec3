//! Assistant chat transcripts.
//!
//! Each conversation keeps its own transcript in the published state.
//! Streamed text is appended to the conversation the request was made in,
//! in arrival order, whichever conversation is on screen at the time.

use crate::error::{EngineError, EngineResult};
use crate::gateway::Gateway;
use crate::store::StateStore;
use pawsync_model::{ChatReply, ChatRequest, ChatRole, ChatStreamEvent, ChatTurn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends chat messages and records the transcripts.
pub struct ChatSession {
    gateway: Arc<dyn Gateway>,
    store: Arc<StateStore>,
}

impl ChatSession {
    /// Creates a session.
    pub fn new(gateway: Arc<dyn Gateway>, store: Arc<StateStore>) -> Self {
        Self { gateway, store }
    }

    /// Puts a conversation on screen.
    pub fn select(&self, conversation_id: &str) {
        let id = conversation_id.to_string();
        self.store.mutate(|state| state.active_conversation = Some(id));
    }

    /// Transcript of one conversation.
    pub fn transcript(&self, conversation_id: &str) -> Vec<ChatTurn> {
        self.store.select(|state| {
            state
                .transcripts
                .get(conversation_id)
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Sends a message and waits for the whole reply.
    pub async fn send(&self, request: ChatRequest) -> EngineResult<ChatReply> {
        validate(&request)?;
        self.push_turn(&request.conversation_id, ChatRole::User, &request.message);
        let reply = self
            .gateway
            .chat(&request)
            .await
            .map_err(EngineError::from)?;
        self.push_turn(&request.conversation_id, ChatRole::Assistant, &reply.answer);
        Ok(reply)
    }

    /// Sends a message and appends the reply as it streams in.
    ///
    /// The final event's answer replaces the streamed text. A stream that
    /// closes without a final event keeps the partial text and fails with
    /// [`EngineError::Codec`].
    pub async fn stream(&self, request: ChatRequest) -> EngineResult<ChatReply> {
        validate(&request)?;
        let conversation = request.conversation_id.clone();
        self.push_turn(&conversation, ChatRole::User, &request.message);
        let mut events = self
            .gateway
            .stream_chat(&request)
            .await
            .map_err(EngineError::from)?;
        self.push_turn(&conversation, ChatRole::Assistant, "");

        while let Some(event) = events.recv().await {
            match event {
                ChatStreamEvent::Delta { delta } => {
                    self.store.mutate(|state| {
                        append_delta(&mut state.transcripts, &conversation, &delta)
                    });
                }
                ChatStreamEvent::Final { response } => {
                    let answer = response.answer.clone();
                    self.store.mutate(|state| {
                        finish_reply(&mut state.transcripts, &conversation, answer)
                    });
                    debug!(conversation = %conversation, "stream complete");
                    return Ok(response);
                }
            }
        }
        warn!(conversation = %conversation, "stream closed without a final reply");
        Err(EngineError::Codec(
            "chat stream closed without a final reply".into(),
        ))
    }

    fn push_turn(&self, conversation_id: &str, role: ChatRole, content: &str) {
        let turn = ChatTurn {
            role,
            content: content.to_string(),
        };
        self.store.mutate(|state| {
            state
                .transcripts
                .entry(conversation_id.to_string())
                .or_default()
                .push(turn)
        });
    }
}

fn validate(request: &ChatRequest) -> EngineResult<()> {
    if request.conversation_id.trim().is_empty() {
        return Err(EngineError::ValidationFailed(
            "conversation_id is required".into(),
        ));
    }
    if request.message.trim().is_empty() {
        return Err(EngineError::ValidationFailed("message is required".into()));
    }
    Ok(())
}

/// Appends streamed text to the open assistant turn of `conversation`.
fn append_delta(
    transcripts: &mut BTreeMap<String, Vec<ChatTurn>>,
    conversation: &str,
    delta: &str,
) {
    let turns = transcripts.entry(conversation.to_string()).or_default();
    match turns.last_mut() {
        Some(turn) if turn.role == ChatRole::Assistant => turn.content.push_str(delta),
        _ => turns.push(ChatTurn {
            role: ChatRole::Assistant,
            content: delta.to_string(),
        }),
    }
}

fn finish_reply(
    transcripts: &mut BTreeMap<String, Vec<ChatTurn>>,
    conversation: &str,
    answer: String,
) {
    let turns = transcripts.entry(conversation.to_string()).or_default();
    match turns.last_mut() {
        Some(turn) if turn.role == ChatRole::Assistant => turn.content = answer,
        _ => turns.push(ChatTurn {
            role: ChatRole::Assistant,
            content: answer,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> ChatTurn {
        ChatTurn {
            role: ChatRole::User,
            content: text.into(),
        }
    }

    #[test]
    fn deltas_append_in_order() {
        let mut transcripts = BTreeMap::new();
        transcripts.insert("c1".to_string(), vec![user("hi")]);
        append_delta(&mut transcripts, "c1", "Hel");
        append_delta(&mut transcripts, "c1", "lo");
        let turns = &transcripts["c1"];
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "Hello");
    }

    #[test]
    fn deltas_stay_in_their_conversation() {
        let mut transcripts = BTreeMap::new();
        transcripts.insert("c1".to_string(), vec![user("walkers?")]);
        transcripts.insert("c2".to_string(), vec![user("groomers?")]);
        append_delta(&mut transcripts, "c1", "Two walkers");
        assert_eq!(transcripts["c2"].len(), 1);
        assert_eq!(transcripts["c1"][1].content, "Two walkers");
    }

    #[test]
    fn final_answer_replaces_partial_text() {
        let mut transcripts = BTreeMap::new();
        append_delta(&mut transcripts, "c1", "Two wal");
        finish_reply(&mut transcripts, "c1", "Two walkers nearby.".into());
        assert_eq!(transcripts["c1"].len(), 1);
        assert_eq!(transcripts["c1"][0].content, "Two walkers nearby.");
    }

    #[test]
    fn blank_message_rejected() {
        let request = ChatRequest {
            conversation_id: "c1".into(),
            user_id: "user_2".into(),
            message: "  ".into(),
            suburb: None,
        };
        assert!(matches!(
            validate(&request),
            Err(EngineError::ValidationFailed(_))
        ));
    }
}
