//! Conversation session manager.
//!
//! A session owns the transcript shown to the user and the extractor's
//! authoritative [`ConversationState`]. The first message starts a
//! conversation; every later one continues it, and each successful response
//! replaces the state wholesale. A failed call leaves the state exactly as it
//! was and appends an error bubble instead.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::conversation::{ConversationState, Message, SEED_GREETING};
use crate::errors::{ConciergeError, Result};
use crate::extractor::GoalExtractor;
use crate::finalize::{FinalizationGate, GoalHandoff};

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The extractor answered. `reply` is `None` when the response carried no
    /// extractor-authored message; `handoff` is set on the turn that
    /// finalized the goal.
    Replied {
        reply: Option<Message>,
        handoff: Option<GoalHandoff>,
    },
    /// The remote call failed; `notice` was appended to the transcript and
    /// the conversation state is unchanged.
    Failed { notice: Message },
}

/// Everything a client needs to redraw the chat screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub transcript: Vec<Message>,
    pub state: Option<ConversationState>,
    pub proposal: Option<GoalHandoff>,
}

pub struct SessionManager {
    extractor: Arc<dyn GoalExtractor>,
    transcript: Vec<Message>,
    state: Option<ConversationState>,
    gate: FinalizationGate,
}

impl SessionManager {
    pub fn new(extractor: Arc<dyn GoalExtractor>) -> Self {
        Self {
            extractor,
            transcript: vec![Message::extractor(SEED_GREETING)],
            state: None,
            gate: FinalizationGate::new(),
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn state(&self) -> Option<&ConversationState> {
        self.state.as_ref()
    }

    /// The finalized goal awaiting confirmation, if any.
    pub fn proposal(&self) -> Option<&GoalHandoff> {
        self.gate.emitted()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            transcript: self.transcript.clone(),
            state: self.state.clone(),
            proposal: self.gate.emitted().cloned(),
        }
    }

    /// Route a user message to start or continue.
    pub async fn send(&mut self, message: &str) -> Result<TurnOutcome> {
        if self.state.is_some() {
            self.continue_conversation(message).await
        } else {
            self.start(message).await
        }
    }

    /// Begin a conversation. Only valid while no conversation is active.
    pub async fn start(&mut self, message: &str) -> Result<TurnOutcome> {
        if self.state.is_some() {
            return Err(ConciergeError::SessionActive);
        }
        let message = normalize(message)?;
        self.transcript.push(Message::user(message));

        let extractor = Arc::clone(&self.extractor);
        let result = extractor.start_conversation(message).await;
        Ok(self.absorb(result))
    }

    /// Continue the active conversation; the response replaces the state.
    pub async fn continue_conversation(&mut self, message: &str) -> Result<TurnOutcome> {
        let message = normalize(message)?;
        let Some(current) = self.state.as_ref() else {
            return Err(ConciergeError::NoActiveConversation);
        };
        // Clone so the transcript can be appended while the call is pending.
        let current = current.clone();
        self.transcript.push(Message::user(message));

        let extractor = Arc::clone(&self.extractor);
        let result = extractor.continue_conversation(&current, message).await;
        Ok(self.absorb(result))
    }

    /// Back to the seed greeting with no conversation and a re-armed gate.
    pub fn reset(&mut self) {
        debug!("Resetting session");
        self.transcript = vec![Message::extractor(SEED_GREETING)];
        self.state = None;
        self.gate.rearm();
    }

    fn absorb(&mut self, result: Result<ConversationState>) -> TurnOutcome {
        match result {
            Ok(next) => {
                let reply = next.latest_reply().cloned();
                if let Some(reply) = &reply {
                    self.transcript.push(reply.clone());
                }
                let handoff = self.gate.evaluate(&next);
                self.state = Some(next);
                TurnOutcome::Replied { reply, handoff }
            }
            Err(err) => {
                warn!("Extractor call failed: {err}");
                let notice = Message::extractor(format!(
                    "Sorry, I couldn't process that ({err}). Please try again."
                ));
                self.transcript.push(notice.clone());
                TurnOutcome::Failed { notice }
            }
        }
    }
}

fn normalize(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ConciergeError::validation("message", "must not be empty"));
    }
    Ok(trimmed)
}
