//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConciergeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extractor error: {0}")]
    Extractor(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("ABI decode error: {0}")]
    Abi(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    /// The transaction was submitted but its confirmation failed. It may
    /// still land, so it must not be resubmitted.
    #[error("Transaction {tx_hash} submitted but not confirmed: {reason}")]
    Unconfirmed { tx_hash: String, reason: String },

    /// A user-supplied value failed validation. `field` names the offending input.
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("A message is already being processed for this session")]
    SessionBusy,

    #[error("A conversation is already active for this session")]
    SessionActive,

    #[error("No active conversation for this session")]
    NoActiveConversation,

    #[error("{0} not found")]
    NotFound(String),

    /// A feature is unusable because its configuration is missing.
    #[error("{0}")]
    Unavailable(String),
}

impl ConciergeError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConciergeError>;
