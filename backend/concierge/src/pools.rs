//! Pool reads and the listing projection.
//!
//! Pools live in the DreamPool contract; this module only reads them. The
//! status shown to users is derived here on every read and never stored:
//!
//! ```text
//! finalized            ──► completed
//! failed               ──► expired
//! now > deadline       ──► expired
//! otherwise            ──► active
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{self, Token, GET_POOL_SELECTOR, POOL_COUNT_SELECTOR};
use crate::errors::Result;
use crate::rpc::RpcClient;
use crate::units::wei_string;

/// The contract stores no metadata, so every pool shares this title.
pub const POOL_TITLE: &str = "DreamPool Goal";

/// Raw on-chain pool record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolData {
    pub pool_id: u64,
    pub creator: String,
    pub recipient: String,
    #[serde(with = "wei_string")]
    pub goal_amount: u128,
    #[serde(with = "wei_string")]
    pub raised_amount: u128,
    /// Unix timestamp (seconds).
    pub deadline: u64,
    pub finalized: bool,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Active,
    Completed,
    Expired,
}

impl PoolData {
    pub fn status(&self, now: u64) -> PoolStatus {
        if self.finalized {
            PoolStatus::Completed
        } else if self.failed || now > self.deadline {
            PoolStatus::Expired
        } else {
            PoolStatus::Active
        }
    }

    pub fn funding_percentage(&self) -> f64 {
        funding_percentage(self.raised_amount, self.goal_amount)
    }
}

/// `min(raised / goal * 100, 100)`; a zero goal reads as 0%.
pub fn funding_percentage(raised: u128, goal: u128) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    (raised as f64 / goal as f64 * 100.0).min(100.0)
}

/// "Expired", "3d 4h" or "5h".
pub fn time_remaining(deadline: u64, now: u64) -> String {
    if deadline <= now {
        return "Expired".to_string();
    }
    let remaining = deadline - now;
    let days = remaining / 86_400;
    let hours = (remaining % 86_400) / 3_600;
    if days > 0 {
        format!("{days}d {hours}h")
    } else {
        format!("{hours}h")
    }
}

fn short_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// A pool as the listing screen shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolView {
    #[serde(flatten)]
    pub pool: PoolData,
    pub status: PoolStatus,
    pub funding_percentage: f64,
    pub title: &'static str,
    pub description: String,
    pub time_remaining: String,
}

impl PoolView {
    pub fn project(pool: PoolData, now: u64) -> Self {
        Self {
            status: pool.status(now),
            funding_percentage: pool.funding_percentage(),
            title: POOL_TITLE,
            description: format!("Pool created by {}", short_address(&pool.creator)),
            time_remaining: time_remaining(pool.deadline, now),
            pool,
        }
    }
}

/// Project raw records for display, newest (highest id) first.
pub fn project_listing(pools: Vec<PoolData>, now: u64) -> Vec<PoolView> {
    let mut views: Vec<PoolView> = pools
        .into_iter()
        .map(|p| PoolView::project(p, now))
        .collect();
    views.sort_by(|a, b| b.pool.pool_id.cmp(&a.pool.pool_id));
    views
}

// ─────────────────────────────────────────────────────────
// Reading pools
// ─────────────────────────────────────────────────────────

#[async_trait]
pub trait PoolReader: Send + Sync {
    async fn pool_count(&self) -> Result<u64>;
    async fn get_pool(&self, pool_id: u64) -> Result<PoolData>;

    /// Every pool, re-read wholesale. Ids run `1..=pool_count`.
    async fn all_pools(&self) -> Result<Vec<PoolData>> {
        let count = self.pool_count().await?;
        debug!("Reading {count} pools");
        futures::future::try_join_all((1..=count).map(|id| self.get_pool(id))).await
    }
}

/// Reads pools from the deployed contract through `eth_call`.
pub struct ContractPoolReader {
    rpc: RpcClient,
    contract_address: String,
}

impl ContractPoolReader {
    pub fn new(rpc: RpcClient, contract_address: impl Into<String>) -> Self {
        Self {
            rpc,
            contract_address: contract_address.into(),
        }
    }
}

#[async_trait]
impl PoolReader for ContractPoolReader {
    async fn pool_count(&self) -> Result<u64> {
        let data = abi::encode_call(POOL_COUNT_SELECTOR, &[]);
        let raw = self.rpc.eth_call(&self.contract_address, &data).await?;
        let words = abi::decode_words(&raw, 1)?;
        abi::word_to_u64(&words[0])
    }

    async fn get_pool(&self, pool_id: u64) -> Result<PoolData> {
        let data = abi::encode_call(GET_POOL_SELECTOR, &[Token::Uint(pool_id as u128)]);
        let raw = self.rpc.eth_call(&self.contract_address, &data).await?;
        decode_pool(pool_id, &raw)
    }
}

/// Decode `getPool` return data:
/// `(creator, recipient, goal, totalContrib, deadline, finalized, failed)`.
pub fn decode_pool(pool_id: u64, raw: &str) -> Result<PoolData> {
    let w = abi::decode_words(raw, 7)?;
    Ok(PoolData {
        pool_id,
        creator: abi::word_to_address(&w[0]),
        recipient: abi::word_to_address(&w[1]),
        goal_amount: abi::word_to_u128(&w[2])?,
        raised_amount: abi::word_to_u128(&w[3])?,
        deadline: abi::word_to_u64(&w[4])?,
        finalized: abi::word_to_bool(&w[5]),
        failed: abi::word_to_bool(&w[6]),
    })
}
