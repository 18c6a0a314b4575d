//! Conversation types exchanged with the goal extractor.
//!
//! The extractor's response is the authoritative conversation state: the
//! client never patches it field by field. Anything the extractor sends that
//! these types do not name (tool-call metadata, agent bookkeeping) is kept in
//! an opaque `extra` map so it survives the round trip back on the next
//! `continue` call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opening line shown before the user has typed anything.
pub const SEED_GREETING: &str = "Hi! I'm your AI concierge. What do you want to own? \
I can help you create a funding goal to make it happen!";

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "human", alias = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant", alias = "extractor")]
    Extractor,
    #[serde(rename = "tool")]
    ToolInvocation,
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    /// Tool metadata and any other fields the extractor attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageKind::User, content)
    }

    pub fn extractor(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Extractor, content)
    }

    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            extra: Map::new(),
        }
    }

    pub fn is_extractor(&self) -> bool {
        self.kind == MessageKind::Extractor
    }
}

/// Full conversation state as returned by `/llm/chat/start` and
/// `/llm/chat/continue`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub goal_description: Option<String>,
    #[serde(default)]
    pub goal_amount_eth: Option<f64>,
    #[serde(default)]
    pub deadline_days: Option<u32>,
    #[serde(default)]
    pub recipient_address: Option<String>,
    #[serde(default)]
    pub conversation_complete: bool,
    /// Ready-to-submit payload; its shape belongs to the extractor.
    #[serde(default)]
    pub contract_payload: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The wire name for a response is the same shape as the state it replaces.
pub type ConversationResponse = ConversationState;

impl ConversationState {
    /// The bubble to show for this response: the last extractor-authored message.
    pub fn latest_reply(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_extractor())
    }

    /// `true` once every structured field the gate can use has been extracted.
    pub fn has_all_fields(&self) -> bool {
        self.goal_description.is_some()
            && self.goal_amount_eth.is_some()
            && self.deadline_days.is_some()
            && self.recipient_address.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_kind_accepts_wire_aliases() {
        let kinds: Vec<MessageKind> =
            serde_json::from_value(json!(["human", "user", "ai", "assistant", "tool"])).unwrap();
        assert_eq!(
            kinds,
            vec![
                MessageKind::User,
                MessageKind::User,
                MessageKind::Extractor,
                MessageKind::Extractor,
                MessageKind::ToolInvocation,
            ]
        );
        assert_eq!(serde_json::to_value(MessageKind::Extractor).unwrap(), json!("ai"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let wire = json!({
            "messages": [
                { "type": "human", "content": "I want a bike" },
                {
                    "type": "tool",
                    "content": "ok",
                    "tool_call_id": "call_1",
                    "name": "extract_eth_amount"
                },
                { "type": "ai", "content": "How much does it cost?" }
            ],
            "goal_description": "a bike",
            "conversation_complete": false,
            "thread_id": "abc-123",
            "step": 4
        });

        let state: ConversationState = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(state.extra.get("thread_id"), Some(&json!("abc-123")));
        assert_eq!(
            state.messages[1].extra.get("tool_call_id"),
            Some(&json!("call_1"))
        );

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["thread_id"], wire["thread_id"]);
        assert_eq!(back["step"], wire["step"]);
        assert_eq!(back["messages"][1]["name"], json!("extract_eth_amount"));
    }

    #[test]
    fn latest_reply_skips_tool_and_user_messages() {
        let state = ConversationState {
            messages: vec![
                Message::extractor("first"),
                Message::user("hi"),
                Message::extractor("second"),
                Message::new(MessageKind::ToolInvocation, "tool output"),
            ],
            ..Default::default()
        };
        assert_eq!(state.latest_reply().map(|m| m.content.as_str()), Some("second"));
    }

    #[test]
    fn latest_reply_is_none_without_extractor_messages() {
        let state = ConversationState {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        assert!(state.latest_reply().is_none());
    }

    #[test]
    fn missing_optional_fields_default() {
        let state: ConversationState = serde_json::from_value(json!({})).unwrap();
        assert!(state.messages.is_empty());
        assert!(!state.conversation_complete);
        assert!(state.contract_payload.is_none());
        assert!(!state.has_all_fields());
    }
}
