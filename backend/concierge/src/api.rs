//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::errors::{ConciergeError, Result};
use crate::extractor::GoalExtractor;
use crate::finalize::{GoalHandoff, ProposedGoal};
use crate::pools::{project_listing, PoolReader, PoolView};
use crate::session::{SessionSnapshot, TurnOutcome};
use crate::store::SessionStore;
use crate::transactions::{EncodedTx, PoolActions};

const WALLET_UNAVAILABLE: &str = "Wallet provider not configured. Set WALLET_PROVIDER=demo for \
the demo wallet or WALLET_PROVIDER=rpc to sign through the RPC node, then restart the concierge.";

pub struct ApiState {
    pub sessions: Arc<SessionStore>,
    pub extractor: Arc<dyn GoalExtractor>,
    pub pools: Arc<dyn PoolReader>,
    /// `None` when no wallet provider is configured.
    pub actions: Option<Arc<PoolActions>>,
}

impl ApiState {
    fn actions(&self) -> Result<Arc<PoolActions>> {
        self.actions
            .clone()
            .ok_or_else(|| ConciergeError::Unavailable(WALLET_UNAVAILABLE.to_string()))
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/messages", post(post_message))
        .route("/sessions/:id/reset", post(reset_session))
        .route("/sessions/:id/confirm", post(confirm_goal))
        .route("/goals/propose", post(propose_goal))
        .route("/goals/build_tx", post(build_tx))
        .route("/pools", get(list_pools))
        .route("/pools/:id", get(get_pool))
        .route("/pools/:id/contributions", post(contribute))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Deserialize, Default)]
pub struct WalletRequest {
    pub wallet_address: Option<String>,
}

#[derive(Deserialize)]
pub struct ContributionRequest {
    pub wallet_address: Option<String>,
    pub amount_eth: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub extractor: bool,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

#[derive(Serialize)]
pub struct TurnResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub outcome: TurnOutcome,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

#[derive(Serialize)]
pub struct PoolsResponse {
    pub count: usize,
    pub pools: Vec<PoolView>,
}

#[derive(Serialize)]
pub struct ConfirmResponse {
    pub tx_hash: String,
    /// Refreshed listing; `None` if the re-read failed after the write landed.
    pub pools: Option<Vec<PoolView>>,
}

#[derive(Serialize)]
pub struct ContributionResponse {
    pub tx_hash: String,
    pub pool: Option<PoolView>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    /// Set when a transaction was submitted but not confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl IntoResponse for ConciergeError {
    fn into_response(self) -> Response {
        let (status, field) = match &self {
            ConciergeError::Validation { field, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, Some(*field))
            }
            ConciergeError::WalletNotConnected => {
                (StatusCode::UNPROCESSABLE_ENTITY, Some("wallet_address"))
            }
            ConciergeError::SessionBusy
            | ConciergeError::SessionActive
            | ConciergeError::NoActiveConversation => (StatusCode::CONFLICT, None),
            ConciergeError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            ConciergeError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            ConciergeError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            ConciergeError::Http(_)
            | ConciergeError::Json(_)
            | ConciergeError::Extractor(_)
            | ConciergeError::Rpc(_)
            | ConciergeError::Abi(_)
            | ConciergeError::Wallet(_)
            | ConciergeError::Unconfirmed { .. } => (StatusCode::BAD_GATEWAY, None),
        };
        let tx_hash = match &self {
            ConciergeError::Unconfirmed { tx_hash, .. } => Some(tx_hash.clone()),
            _ => None,
        };
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                field,
                tx_hash,
            }),
        )
            .into_response()
    }
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

async fn listing(state: &ApiState) -> Result<Vec<PoolView>> {
    let pools = state.pools.all_pools().await?;
    Ok(project_listing(pools, now_unix()))
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        extractor: state.extractor.health().await,
    })
}

/// `POST /sessions`
pub async fn create_session(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let (session_id, session) = state.sessions.create().await;
    let snapshot = session.lock().await.snapshot();
    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            snapshot,
        }),
    )
}

/// `GET /sessions/:id`
///
/// Waits for an in-flight turn rather than answering 409.
pub async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    let snapshot = state.sessions.snapshot(session_id).await?;
    Ok(Json(SessionResponse {
        session_id,
        snapshot,
    }))
}

/// `DELETE /sessions/:id`
pub async fn delete_session(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.sessions.remove(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sessions/:id/messages`
///
/// Runs one chat turn. A second message while one is pending gets 409.
pub async fn post_message(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<TurnResponse>> {
    let (outcome, snapshot) = state.sessions.send(session_id, body.message).await?;
    Ok(Json(TurnResponse {
        session_id,
        outcome,
        snapshot,
    }))
}

/// `POST /sessions/:id/reset`
pub async fn reset_session(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    let mut session = state.sessions.lock(session_id).await?;
    session.reset();
    Ok(Json(SessionResponse {
        session_id,
        snapshot: session.snapshot(),
    }))
}

/// `POST /sessions/:id/confirm`
///
/// Creates a pool from the session's finalized goal and returns the
/// refreshed pool listing. The session is reset as soon as the wallet
/// accepts the transaction, so a failed confirmation can't be retried into a
/// second pool; the error then carries the pending hash.
pub async fn confirm_goal(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<Uuid>,
    body: Option<Json<WalletRequest>>,
) -> Result<Json<ConfirmResponse>> {
    let actions = state.actions()?;
    let wallet_address = body.map(|Json(b)| b).unwrap_or_default().wallet_address;
    let mut session = state.sessions.lock(session_id).await?;
    let handoff: GoalHandoff = session.proposal().cloned().ok_or_else(|| {
        ConciergeError::validation("proposal", "no finalized goal to confirm")
    })?;

    // The write runs to completion even if the client disconnects.
    let tx_hash = tokio::spawn(async move {
        let hash = actions
            .submit_pool(&handoff, wallet_address.as_deref())
            .await?;
        session.reset();
        drop(session);
        actions.confirm(&hash).await?;
        Ok::<_, ConciergeError>(hash)
    })
    .await
    .map_err(|e| ConciergeError::Wallet(format!("pool creation aborted: {e}")))??;

    let pools = match listing(&state).await {
        Ok(pools) => Some(pools),
        Err(e) => {
            warn!("Pool created ({tx_hash}) but listing refresh failed: {e}");
            None
        }
    };
    Ok(Json(ConfirmResponse { tx_hash, pools }))
}

/// `POST /goals/propose`
pub async fn propose_goal(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<ProposedGoal>> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(ConciergeError::validation("message", "must not be empty"));
    }
    Ok(Json(state.extractor.propose(message).await?))
}

/// `POST /goals/build_tx`
pub async fn build_tx(
    State(state): State<Arc<ApiState>>,
    Json(goal): Json<ProposedGoal>,
) -> Result<Json<EncodedTx>> {
    Ok(Json(state.extractor.build_tx(&goal).await?))
}

/// `GET /pools`
///
/// Re-reads every pool from the contract, newest first.
pub async fn list_pools(State(state): State<Arc<ApiState>>) -> Result<Json<PoolsResponse>> {
    let pools = listing(&state).await?;
    Ok(Json(PoolsResponse {
        count: pools.len(),
        pools,
    }))
}

/// `GET /pools/:id`
pub async fn get_pool(
    State(state): State<Arc<ApiState>>,
    Path(pool_id): Path<u64>,
) -> Result<Json<PoolView>> {
    Ok(Json(read_pool(&state, pool_id).await?))
}

async fn read_pool(state: &ApiState, pool_id: u64) -> Result<PoolView> {
    let count = state.pools.pool_count().await?;
    if pool_id == 0 || pool_id > count {
        return Err(ConciergeError::NotFound(format!("Pool {pool_id}")));
    }
    let pool = state.pools.get_pool(pool_id).await?;
    Ok(PoolView::project(pool, now_unix()))
}

/// `POST /pools/:id/contributions`
pub async fn contribute(
    State(state): State<Arc<ApiState>>,
    Path(pool_id): Path<u64>,
    Json(body): Json<ContributionRequest>,
) -> Result<Json<ContributionResponse>> {
    let actions = state.actions()?;
    read_pool(&state, pool_id).await?;

    let tx_hash = tokio::spawn(async move {
        actions
            .contribute(pool_id, &body.amount_eth, body.wallet_address.as_deref())
            .await
    })
    .await
    .map_err(|e| ConciergeError::Wallet(format!("contribution aborted: {e}")))??;

    let pool = match read_pool(&state, pool_id).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Contribution {tx_hash} sent but pool refresh failed: {e}");
            None
        }
    };
    Ok(Json(ContributionResponse { tx_hash, pool }))
}
