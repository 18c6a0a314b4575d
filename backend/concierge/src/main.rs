//! DreamPool concierge: entry point.
//!
//! Serves the chat sessions and pool listing over an Axum REST API. Goal
//! extraction is delegated to the extractor service; pool reads and writes
//! go to the contract over JSON-RPC.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dreampool_concierge::api::{self, ApiState};
use dreampool_concierge::config::{Config, WalletProvider};
use dreampool_concierge::extractor::{DemoExtractor, GoalExtractor, HttpExtractor};
use dreampool_concierge::pools::ContractPoolReader;
use dreampool_concierge::rpc::RpcClient;
use dreampool_concierge::store::{self, SessionStore};
use dreampool_concierge::transactions::PoolActions;
use dreampool_concierge::wallet::{DemoWallet, RpcWallet, Wallet};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Optional .env file.
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let client = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    // ─── Extractor ────────────────────────────────────────
    let extractor: Arc<dyn GoalExtractor> = if config.demo_mode {
        info!("Demo mode: conversations complete locally");
        Arc::new(DemoExtractor)
    } else {
        info!("Goal extractor at {}", config.extractor_url);
        Arc::new(HttpExtractor::new(client.clone(), config.extractor_url.clone()))
    };

    // ─── Contract access ──────────────────────────────────
    let rpc = RpcClient::new(client, config.rpc_url.clone(), config.rpc_max_retries);
    let pools = Arc::new(ContractPoolReader::new(
        rpc.clone(),
        config.contract_address.clone(),
    ));

    let wallet: Option<Arc<dyn Wallet>> = match config.wallet_provider {
        Some(WalletProvider::Demo) => Some(Arc::new(DemoWallet)),
        Some(WalletProvider::Rpc) => Some(Arc::new(RpcWallet::new(
            rpc,
            Duration::from_millis(config.receipt_poll_interval_ms),
            Duration::from_secs(config.receipt_timeout_secs),
        ))),
        None => {
            warn!("WALLET_PROVIDER not set; pool creation and contributions are disabled");
            None
        }
    };
    let actions = wallet.map(|w| Arc::new(PoolActions::new(w, config.contract_address.clone())));

    // ─── Sessions ─────────────────────────────────────────
    let sessions = Arc::new(SessionStore::new(Arc::clone(&extractor)));
    tokio::spawn(store::run_expiry(
        Arc::clone(&sessions),
        Duration::from_secs(config.session_idle_secs),
        Duration::from_secs(config.session_sweep_secs),
    ));

    // ─── REST API ─────────────────────────────────────────
    let state = Arc::new(ApiState {
        sessions,
        extractor,
        pools,
        actions,
    });
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
