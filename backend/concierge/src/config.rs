//! Application configuration loaded from environment variables.

use crate::errors::{ConciergeError, Result};

/// Address of the deployed DreamPool contract on Base Sepolia.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x8519F9f785667a7b05B441219832121ce2C636eE";

/// Which wallet collaborator signs pool creation and contribution transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletProvider {
    /// Fake transaction hashes, instant confirmation.
    Demo,
    /// `eth_sendTransaction` against a node that manages the sender's keys.
    Rpc,
}

impl WalletProvider {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "rpc" => Ok(Self::Rpc),
            other => Err(ConciergeError::Config(format!(
                "Invalid WALLET_PROVIDER '{other}' (expected 'demo' or 'rpc')"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the goal extractor HTTP API (e.g. http://localhost:8000)
    pub extractor_url: String,
    /// Ethereum JSON-RPC endpoint used for pool reads and the rpc wallet
    pub rpc_url: String,
    /// DreamPool contract address (0x-prefixed hex)
    pub contract_address: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout_secs: u64,
    /// How many times a failed JSON-RPC read is retried before giving up
    pub rpc_max_retries: u32,
    /// Wallet collaborator; `None` leaves transaction routes unavailable
    pub wallet_provider: Option<WalletProvider>,
    /// Delay between transaction receipt polls
    pub receipt_poll_interval_ms: u64,
    /// Give up waiting for a receipt after this long
    pub receipt_timeout_secs: u64,
    /// Bypass the remote extractor and complete conversations locally
    pub demo_mode: bool,
    /// Sessions untouched for this long are dropped
    pub session_idle_secs: u64,
    /// How often idle sessions are swept
    pub session_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` is the
    /// production entry point; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            extractor_url: var("EXTRACTOR_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            rpc_url: var("RPC_URL", "https://sepolia.base.org"),
            contract_address: parse_address(&var("CONTRACT_ADDRESS", DEFAULT_CONTRACT_ADDRESS))?,
            api_port: var("API_PORT", "3002")
                .parse()
                .map_err(|_| ConciergeError::Config("Invalid API_PORT".to_string()))?,
            http_timeout_secs: var("HTTP_TIMEOUT_SECS", "30")
                .parse()
                .map_err(|_| ConciergeError::Config("Invalid HTTP_TIMEOUT_SECS".to_string()))?,
            rpc_max_retries: var("RPC_MAX_RETRIES", "3")
                .parse()
                .map_err(|_| ConciergeError::Config("Invalid RPC_MAX_RETRIES".to_string()))?,
            wallet_provider: lookup("WALLET_PROVIDER")
                .filter(|v| !v.trim().is_empty())
                .map(|v| WalletProvider::parse(&v))
                .transpose()?,
            receipt_poll_interval_ms: var("RECEIPT_POLL_INTERVAL_MS", "2000")
                .parse()
                .map_err(|_| {
                    ConciergeError::Config("Invalid RECEIPT_POLL_INTERVAL_MS".to_string())
                })?,
            receipt_timeout_secs: var("RECEIPT_TIMEOUT_SECS", "120")
                .parse()
                .map_err(|_| ConciergeError::Config("Invalid RECEIPT_TIMEOUT_SECS".to_string()))?,
            demo_mode: parse_bool(&var("DEMO_MODE", "false"))
                .ok_or_else(|| ConciergeError::Config("Invalid DEMO_MODE".to_string()))?,
            session_idle_secs: var("SESSION_IDLE_SECS", "3600")
                .parse()
                .map_err(|_| ConciergeError::Config("Invalid SESSION_IDLE_SECS".to_string()))?,
            session_sweep_secs: var("SESSION_SWEEP_SECS", "60")
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConciergeError::Config("Invalid SESSION_SWEEP_SECS".to_string()))?,
        })
    }
}

fn parse_address(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| ConciergeError::Config("CONTRACT_ADDRESS must start with 0x".to_string()))?;
    if hex_part.len() != 40 || hex::decode(hex_part).is_err() {
        return Err(ConciergeError::Config(
            "CONTRACT_ADDRESS must be 20 hex-encoded bytes".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
