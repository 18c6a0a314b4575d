//! Wallet collaborators that sign and submit transactions.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{ConciergeError, Result};
use crate::rpc::RpcClient;
use crate::transactions::EncodedTx;

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Submit `tx` from `from`; returns the transaction hash.
    async fn send_transaction(&self, from: &str, tx: &EncodedTx) -> Result<String>;

    /// Wait until `hash` is mined. Errors if it reverts or never confirms.
    async fn wait_for_confirmation(&self, hash: &str) -> Result<()>;
}

/// Pretends to send: random hashes, instant confirmation.
#[derive(Debug, Default)]
pub struct DemoWallet;

#[async_trait]
impl Wallet for DemoWallet {
    async fn send_transaction(&self, from: &str, tx: &EncodedTx) -> Result<String> {
        let hash = format!(
            "0x{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        info!("Demo wallet: {from} -> {} ({} wei) = {hash}", tx.to, tx.value);
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, _hash: &str) -> Result<()> {
        Ok(())
    }
}

/// Sends through a node that holds the sender's keys (`eth_sendTransaction`).
pub struct RpcWallet {
    rpc: RpcClient,
    poll_interval: Duration,
    timeout: Duration,
}

impl RpcWallet {
    pub fn new(rpc: RpcClient, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            rpc,
            poll_interval,
            timeout,
        }
    }
}

#[async_trait]
impl Wallet for RpcWallet {
    async fn send_transaction(&self, from: &str, tx: &EncodedTx) -> Result<String> {
        let hash = self
            .rpc
            .send_transaction(from, &tx.to, &tx.data, tx.value)
            .await?;
        info!("Submitted transaction {hash} from {from}");
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, hash: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if let Some(receipt) = self.rpc.get_transaction_receipt(hash).await? {
                if receipt.succeeded() {
                    info!("Transaction {hash} confirmed");
                    return Ok(());
                }
                return Err(ConciergeError::Wallet(format!("Transaction {hash} reverted")));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ConciergeError::Wallet(format!(
                    "Transaction {hash} not confirmed after {}s",
                    self.timeout.as_secs()
                )));
            }
            debug!("Transaction {hash} pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
