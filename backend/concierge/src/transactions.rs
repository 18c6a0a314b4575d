//! Pool creation and contribution: argument derivation, calldata encoding and
//! the submit-then-confirm flow through a [`Wallet`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::abi::{self, Token, CREATE_POOL_SELECTOR, DEPOSIT_SELECTOR};
use crate::errors::{ConciergeError, Result};
use crate::finalize::{GoalHandoff, ProposedGoal, DEFAULT_DEADLINE_DAYS};
use crate::units::{eth_to_wei, parse_ether, wei_string};
use crate::wallet::Wallet;

const SECONDS_PER_DAY: u64 = 86_400;

/// A ready-to-send contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedTx {
    pub to: String,
    pub data: String,
    /// Wei attached to the call.
    #[serde(with = "wei_string")]
    pub value: u128,
}

/// Arguments to `createPool(recipient, goalAmountWei, deadlineUnixTs)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePoolArgs {
    pub recipient: [u8; 20],
    pub goal_wei: u128,
    pub deadline: u64,
}

impl CreatePoolArgs {
    /// Resolve a finalized handoff into contract arguments. A zero-address
    /// recipient becomes `caller`.
    pub fn from_handoff(handoff: &GoalHandoff, caller: &str, now: u64) -> Result<Self> {
        match handoff {
            GoalHandoff::Goal(goal) => Self::from_goal(goal, caller, now),
            GoalHandoff::Payload(payload) => Self::from_payload(payload, caller, now),
        }
    }

    pub fn from_goal(goal: &ProposedGoal, caller: &str, now: u64) -> Result<Self> {
        let goal_wei = eth_to_wei(goal.cost_eth);
        if goal_wei == 0 {
            return Err(ConciergeError::validation("cost_eth", "must be greater than zero"));
        }
        Ok(Self {
            recipient: resolve_recipient(&goal.recipient, caller)?,
            goal_wei,
            deadline: deadline_after(now, goal.deadline_days as u64)
                .ok_or_else(|| ConciergeError::validation("deadline_days", "out of range"))?,
        })
    }

    /// Read the extractor's payload keys, preferring exact wei / timestamp
    /// values over their eth / day-count counterparts.
    pub fn from_payload(payload: &Value, caller: &str, now: u64) -> Result<Self> {
        let recipient = payload
            .get("recipient_address")
            .or_else(|| payload.get("recipient"))
            .and_then(Value::as_str)
            .unwrap_or(abi::ZERO_ADDRESS);

        let goal_wei = match payload.get("goal_amount_wei").and_then(value_to_u128) {
            Some(wei) => wei,
            None => payload
                .get("goal_amount_eth")
                .and_then(Value::as_f64)
                .map(eth_to_wei)
                .unwrap_or(0),
        };
        if goal_wei == 0 {
            return Err(ConciergeError::validation(
                "contract_payload",
                "missing goal amount",
            ));
        }

        let deadline = match payload.get("deadline_timestamp").and_then(value_to_u128) {
            Some(ts) => u64::try_from(ts).map_err(|_| {
                ConciergeError::validation("contract_payload", "deadline out of range")
            })?,
            None => {
                let days = payload
                    .get("deadline_days")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_DEADLINE_DAYS as u64);
                deadline_after(now, days).ok_or_else(|| {
                    ConciergeError::validation("contract_payload", "deadline out of range")
                })?
            }
        };

        Ok(Self {
            recipient: resolve_recipient(recipient, caller)?,
            goal_wei,
            deadline,
        })
    }

    pub fn encode(&self, contract_address: &str) -> EncodedTx {
        EncodedTx {
            to: contract_address.to_string(),
            data: abi::encode_call(
                CREATE_POOL_SELECTOR,
                &[
                    Token::Address(self.recipient),
                    Token::Uint(self.goal_wei),
                    Token::Uint(self.deadline as u128),
                ],
            ),
            value: 0,
        }
    }
}

fn deadline_after(now: u64, days: u64) -> Option<u64> {
    days.checked_mul(SECONDS_PER_DAY)
        .and_then(|secs| now.checked_add(secs))
}

fn resolve_recipient(recipient: &str, caller: &str) -> Result<[u8; 20]> {
    if recipient.trim().is_empty() || abi::is_zero_address(recipient) {
        abi::parse_address(caller)
    } else {
        abi::parse_address(recipient)
    }
}

/// Accept integers, decimal strings and `0x` quantities.
fn value_to_u128(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_part) => u128::from_str_radix(hex_part, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

pub fn encode_deposit(contract_address: &str, pool_id: u64, amount_wei: u128) -> EncodedTx {
    EncodedTx {
        to: contract_address.to_string(),
        data: abi::encode_call(DEPOSIT_SELECTOR, &[Token::Uint(pool_id as u128)]),
        value: amount_wei,
    }
}

/// Submits pool writes for a connected wallet address.
pub struct PoolActions {
    wallet: Arc<dyn Wallet>,
    contract_address: String,
}

impl PoolActions {
    pub fn new(wallet: Arc<dyn Wallet>, contract_address: impl Into<String>) -> Self {
        Self {
            wallet,
            contract_address: contract_address.into(),
        }
    }

    /// Submit `createPool` for a finalized handoff. Returns once the wallet
    /// accepts the transaction; see [`PoolActions::confirm`].
    pub async fn submit_pool(
        &self,
        handoff: &GoalHandoff,
        caller: Option<&str>,
    ) -> Result<String> {
        let caller = connected(caller)?;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let args = CreatePoolArgs::from_handoff(handoff, caller, now)?;
        let tx = args.encode(&self.contract_address);

        info!(
            "Creating pool: goal={} wei deadline={} recipient={}",
            args.goal_wei,
            args.deadline,
            abi::format_address(&args.recipient)
        );
        self.wallet.send_transaction(caller, &tx).await
    }

    /// Deposit `amount_eth` (decimal string) into `pool_id` and wait for
    /// confirmation.
    pub async fn contribute(
        &self,
        pool_id: u64,
        amount_eth: &str,
        caller: Option<&str>,
    ) -> Result<String> {
        let caller = connected(caller)?;
        let amount_wei = parse_ether(amount_eth)?;
        let tx = encode_deposit(&self.contract_address, pool_id, amount_wei);

        info!("Contributing {amount_wei} wei to pool {pool_id}");
        let hash = self.wallet.send_transaction(caller, &tx).await?;
        self.confirm(&hash).await?;
        Ok(hash)
    }

    /// Wait for a submitted transaction. Failures carry the hash as
    /// [`ConciergeError::Unconfirmed`].
    pub async fn confirm(&self, tx_hash: &str) -> Result<()> {
        self.wallet
            .wait_for_confirmation(tx_hash)
            .await
            .map_err(|e| ConciergeError::Unconfirmed {
                tx_hash: tx_hash.to_string(),
                reason: e.to_string(),
            })
    }
}

/// The connected wallet address, validated. Absent or blank means not connected.
fn connected(caller: Option<&str>) -> Result<&str> {
    let caller = caller
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(ConciergeError::WalletNotConnected)?;
    abi::parse_address(caller).map_err(|_| {
        ConciergeError::validation("wallet_address", "not a valid 0x address")
    })?;
    Ok(caller)
}
