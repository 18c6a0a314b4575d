//! Goal finalization: turning a completed conversation into exactly one
//! submittable goal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::abi::ZERO_ADDRESS;
use crate::conversation::ConversationState;

pub const DEFAULT_GOAL_TITLE: &str = "Unknown Goal";
pub const DEFAULT_COST_ETH: f64 = 1.0;
pub const DEFAULT_DEADLINE_DAYS: u32 = 30;

/// Longest prefix of the user's message used for a placeholder title.
const PLACEHOLDER_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedGoal {
    pub title: String,
    pub cost_eth: f64,
    pub deadline_days: u32,
    /// The zero address means "the connected wallet".
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProposedGoal {
    /// Project a completed state's structured fields, substituting defaults
    /// for anything the extractor left out.
    pub fn from_fields(state: &ConversationState) -> Self {
        Self {
            title: state
                .goal_description
                .clone()
                .unwrap_or_else(|| DEFAULT_GOAL_TITLE.to_string()),
            cost_eth: state.goal_amount_eth.unwrap_or(DEFAULT_COST_ETH),
            deadline_days: state.deadline_days.unwrap_or(DEFAULT_DEADLINE_DAYS),
            recipient: state
                .recipient_address
                .clone()
                .unwrap_or_else(|| ZERO_ADDRESS.to_string()),
            description: state.goal_description.clone(),
        }
    }

    /// Synthetic goal used when extraction is bypassed.
    pub fn placeholder(message: &str) -> Self {
        let message = message.trim();
        let mut title: String = message.chars().take(PLACEHOLDER_TITLE_CHARS).collect();
        if message.chars().count() > PLACEHOLDER_TITLE_CHARS {
            title.push_str("...");
        }
        Self {
            title: format!("Goal: {title}"),
            cost_eth: DEFAULT_COST_ETH,
            deadline_days: DEFAULT_DEADLINE_DAYS,
            recipient: ZERO_ADDRESS.to_string(),
            description: Some(format!("This is a demo goal created from: \"{message}\"")),
        }
    }

    pub fn recipient_is_caller(&self) -> bool {
        crate::abi::is_zero_address(&self.recipient)
    }
}

/// What the gate hands to pool creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GoalHandoff {
    /// The extractor's ready-made payload, passed on verbatim.
    Payload(Value),
    /// Goal synthesized from the structured fields.
    Goal(ProposedGoal),
}

/// Emits at most one handoff per session. [`FinalizationGate::rearm`]
/// starts a fresh session.
#[derive(Debug, Default)]
pub struct FinalizationGate {
    emitted: Option<GoalHandoff>,
}

impl FinalizationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a freshly merged state. Returns the handoff the first time a
    /// complete state is seen and `None` ever after.
    pub fn evaluate(&mut self, state: &ConversationState) -> Option<GoalHandoff> {
        if !state.conversation_complete || self.emitted.is_some() {
            return None;
        }

        let handoff = match &state.contract_payload {
            Some(payload) if !payload.is_null() => GoalHandoff::Payload(payload.clone()),
            _ => GoalHandoff::Goal(ProposedGoal::from_fields(state)),
        };
        info!(
            "Conversation finalized ({})",
            match handoff {
                GoalHandoff::Payload(_) => "extractor payload",
                GoalHandoff::Goal(_) => "synthesized goal",
            }
        );
        self.emitted = Some(handoff.clone());
        Some(handoff)
    }

    /// The handoff already emitted for this session, if any.
    pub fn emitted(&self) -> Option<&GoalHandoff> {
        self.emitted.as_ref()
    }

    pub fn rearm(&mut self) {
        self.emitted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete() -> ConversationState {
        ConversationState {
            conversation_complete: true,
            ..Default::default()
        }
    }

    #[test]
    fn incomplete_state_yields_nothing() {
        let mut gate = FinalizationGate::new();
        assert!(gate.evaluate(&ConversationState::default()).is_none());
        assert!(gate.emitted().is_none());
    }

    #[test]
    fn all_fields_absent_uses_documented_defaults() {
        let mut gate = FinalizationGate::new();
        let handoff = gate.evaluate(&complete()).unwrap();
        assert_eq!(
            handoff,
            GoalHandoff::Goal(ProposedGoal {
                title: DEFAULT_GOAL_TITLE.to_string(),
                cost_eth: DEFAULT_COST_ETH,
                deadline_days: DEFAULT_DEADLINE_DAYS,
                recipient: ZERO_ADDRESS.to_string(),
                description: None,
            })
        );
    }

    #[test]
    fn payload_is_preferred_verbatim() {
        let payload = json!({ "goal_amount_wei": "2000000000000000000", "deadline_days": 7 });
        let state = ConversationState {
            contract_payload: Some(payload.clone()),
            goal_description: Some("ignored".to_string()),
            ..complete()
        };
        let mut gate = FinalizationGate::new();
        assert_eq!(gate.evaluate(&state), Some(GoalHandoff::Payload(payload)));
    }

    #[test]
    fn evaluating_twice_emits_once() {
        let mut gate = FinalizationGate::new();
        let state = complete();
        assert!(gate.evaluate(&state).is_some());
        assert!(gate.evaluate(&state).is_none());
        assert!(gate.evaluate(&state.clone()).is_none());
        assert!(gate.emitted().is_some());
    }

    #[test]
    fn rearm_allows_a_new_session_to_finalize() {
        let mut gate = FinalizationGate::new();
        gate.evaluate(&complete());
        gate.rearm();
        assert!(gate.emitted().is_none());
        assert!(gate.evaluate(&complete()).is_some());
    }

    #[test]
    fn extracted_fields_are_used() {
        let state = ConversationState {
            goal_description: Some("gaming PC".to_string()),
            goal_amount_eth: Some(0.8),
            deadline_days: Some(30),
            recipient_address: Some("0xcC31859af72EaFE13C843d4A5C5d3784B5615677".to_string()),
            ..complete()
        };
        let goal = ProposedGoal::from_fields(&state);
        assert_eq!(goal.title, "gaming PC");
        assert_eq!(goal.cost_eth, 0.8);
        assert_eq!(goal.deadline_days, 30);
        assert!(!goal.recipient_is_caller());
    }

    #[test]
    fn placeholder_truncates_long_messages() {
        let long = "a".repeat(60);
        let goal = ProposedGoal::placeholder(&long);
        assert_eq!(goal.title, format!("Goal: {}...", "a".repeat(50)));
        assert!(goal.recipient_is_caller());

        let short = ProposedGoal::placeholder("  a bike ");
        assert_eq!(short.title, "Goal: a bike");
    }
}
