//! Goal extractor clients.
//!
//! The extractor is the language-model backend that turns chat into goal
//! fields. [`HttpExtractor`] talks to the real API; [`DemoExtractor`]
//! completes every conversation locally with a placeholder goal.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::conversation::{ConversationResponse, ConversationState, Message};
use crate::errors::{ConciergeError, Result};
use crate::finalize::ProposedGoal;
use crate::transactions::EncodedTx;

#[async_trait]
pub trait GoalExtractor: Send + Sync {
    async fn start_conversation(&self, message: &str) -> Result<ConversationResponse>;

    /// `state` is sent back exactly as the extractor last returned it.
    async fn continue_conversation(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<ConversationResponse>;

    /// Legacy one-shot extraction.
    async fn propose(&self, message: &str) -> Result<ProposedGoal>;

    /// Legacy server-side transaction build.
    async fn build_tx(&self, goal: &ProposedGoal) -> Result<EncodedTx>;

    async fn health(&self) -> bool;
}

// ─────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────

pub struct HttpExtractor {
    client: Client,
    base_url: String,
}

impl HttpExtractor {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!("POST {url}");
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("Extractor {path} returned {status}: {detail}");
            return Err(ConciergeError::Extractor(format!("{path} returned {status}")));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GoalExtractor for HttpExtractor {
    async fn start_conversation(&self, message: &str) -> Result<ConversationResponse> {
        self.post("/llm/chat/start", &json!({ "message": message })).await
    }

    async fn continue_conversation(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<ConversationResponse> {
        self.post(
            "/llm/chat/continue",
            &json!({ "state": state, "message": message }),
        )
        .await
    }

    async fn propose(&self, message: &str) -> Result<ProposedGoal> {
        self.post("/llm/propose", &json!({ "message": message })).await
    }

    async fn build_tx(&self, goal: &ProposedGoal) -> Result<EncodedTx> {
        let raw: Value = self.post("/llm/build_tx", goal).await?;
        let missing =
            |key: &str| ConciergeError::Extractor(format!("build_tx response missing {key}"));
        let field = |key: &str| {
            raw.get(key)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| missing(key))
        };
        // Wei, as a JSON integer or a decimal string.
        let value = match raw.get("value") {
            Some(Value::Number(n)) => n.as_u64().map(u128::from),
            Some(Value::String(s)) => s.parse::<u128>().ok(),
            _ => None,
        }
        .ok_or_else(|| missing("value"))?;
        Ok(EncodedTx {
            to: field("to")?,
            data: field("data")?,
            value,
        })
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                warn!("Extractor health check failed: {e}");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Demo
// ─────────────────────────────────────────────────────────

/// Completes on the first message with [`ProposedGoal::placeholder`].
#[derive(Debug, Default)]
pub struct DemoExtractor;

impl DemoExtractor {
    fn complete_with(&self, mut messages: Vec<Message>, message: &str) -> ConversationResponse {
        let goal = ProposedGoal::placeholder(message);
        messages.push(Message::user(message));
        messages.push(Message::extractor(format!(
            "Great! I can help you set up a funding goal for \"{}\".\n\n\
             Cost: {} ETH\nDeadline: {} days\nRecipient: Your wallet\n\n\
             Ready to create this goal? (Demo mode)",
            goal.title, goal.cost_eth, goal.deadline_days
        )));
        ConversationState {
            messages,
            goal_description: Some(goal.title),
            goal_amount_eth: Some(goal.cost_eth),
            deadline_days: Some(goal.deadline_days),
            recipient_address: Some(goal.recipient),
            conversation_complete: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl GoalExtractor for DemoExtractor {
    async fn start_conversation(&self, message: &str) -> Result<ConversationResponse> {
        Ok(self.complete_with(Vec::new(), message))
    }

    async fn continue_conversation(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<ConversationResponse> {
        Ok(self.complete_with(state.messages.clone(), message))
    }

    async fn propose(&self, message: &str) -> Result<ProposedGoal> {
        Ok(ProposedGoal::placeholder(message))
    }

    async fn build_tx(&self, _goal: &ProposedGoal) -> Result<EncodedTx> {
        Err(ConciergeError::Unavailable(
            "build_tx is not available in demo mode".to_string(),
        ))
    }

    async fn health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ZERO_ADDRESS;
    use mockito::Matcher;

    #[tokio::test]
    async fn start_posts_message_and_decodes_state() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/llm/chat/start")
            .match_body(Matcher::Json(json!({ "message": "I want a gaming PC" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "messages": [
                        { "type": "human", "content": "I want a gaming PC" },
                        { "type": "ai", "content": "How much ETH do you need?" }
                    ],
                    "goal_description": "gaming PC",
                    "conversation_complete": false,
                    "contract_payload": null
                })
                .to_string(),
            )
            .create_async()
            .await;

        let extractor = HttpExtractor::new(Client::new(), server.url());
        let state = extractor.start_conversation("I want a gaming PC").await.unwrap();
        assert_eq!(state.goal_description.as_deref(), Some("gaming PC"));
        assert!(!state.conversation_complete);
        assert_eq!(
            state.latest_reply().map(|m| m.content.as_str()),
            Some("How much ETH do you need?")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn continue_sends_state_back_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/llm/chat/continue")
            .match_body(Matcher::PartialJson(json!({
                "message": "30 days",
                "state": { "thread_id": "t-1", "goal_description": "bike" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messages":[],"conversation_complete":true}"#)
            .create_async()
            .await;

        let state: ConversationState =
            serde_json::from_value(json!({ "goal_description": "bike", "thread_id": "t-1" }))
                .unwrap();
        let extractor = HttpExtractor::new(Client::new(), server.url());
        let next = extractor.continue_conversation(&state, "30 days").await.unwrap();
        assert!(next.conversation_complete);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_an_extractor_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/llm/chat/start")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let extractor = HttpExtractor::new(Client::new(), server.url());
        let err = extractor.start_conversation("hi").await.unwrap_err();
        assert!(matches!(err, ConciergeError::Extractor(_)));
    }

    #[tokio::test]
    async fn build_tx_reads_numeric_value() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/llm/build_tx")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"to":"0xabc","data":"0x12345678","value":0}"#)
            .create_async()
            .await;

        let extractor = HttpExtractor::new(Client::new(), server.url());
        let tx = extractor
            .build_tx(&ProposedGoal::placeholder("bike"))
            .await
            .unwrap();
        assert_eq!(tx.to, "0xabc");
        assert_eq!(tx.value, 0);
    }

    #[tokio::test]
    async fn build_tx_without_value_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/llm/build_tx")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"to":"0xabc","data":"0x12345678","value":-1.5}"#)
            .create_async()
            .await;

        let extractor = HttpExtractor::new(Client::new(), server.url());
        let err = extractor
            .build_tx(&ProposedGoal::placeholder("bike"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing value"));
    }

    #[tokio::test]
    async fn health_reflects_status_code() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"healthy"}"#)
            .create_async()
            .await;
        let extractor = HttpExtractor::new(Client::new(), server.url());
        assert!(extractor.health().await);

        let down = HttpExtractor::new(Client::new(), "http://127.0.0.1:1");
        assert!(!down.health().await);
    }

    #[tokio::test]
    async fn demo_extractor_completes_immediately() {
        let state = DemoExtractor.start_conversation("a bike").await.unwrap();
        assert!(state.conversation_complete);
        assert_eq!(state.recipient_address.as_deref(), Some(ZERO_ADDRESS));
        assert!(state.latest_reply().unwrap().content.contains("Demo mode"));
        assert!(DemoExtractor.build_tx(&ProposedGoal::placeholder("x")).await.is_err());
    }
}
