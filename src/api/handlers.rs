//! REST API handlers
//!
//! Thin request/response layer over the shared ledger, pool and gossip
//! handles. All consensus decisions stay in the core; handlers only
//! translate results into status codes.

use crate::core::{Block, Ledger, Transaction, UnspentTxOut};
use crate::crypto::is_valid_address;
use crate::mining::{Miner, MiningTask, PoolError, TransactionPool};
use crate::network::{GossipSync, NodeHandle};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<RwLock<Ledger>>,
    pub pool: Arc<RwLock<TransactionPool>>,
    pub sync: Arc<GossipSync>,
    pub node: NodeHandle,
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Serialize)]
pub struct ChainInfo {
    pub height: u64,
    pub latest_hash: String,
    pub next_difficulty: u32,
    pub accumulated_work: u128,
    pub pending_transactions: usize,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
    pub utxo_count: usize,
}

#[derive(Deserialize)]
pub struct MineRequest {
    pub reward_address: String,
    pub fee_address: Option<String>,
}

#[derive(Deserialize)]
pub struct ConnectPeerRequest {
    pub address: String,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn reject<T>(status: StatusCode, error: impl ToString) -> ApiResult<T> {
    Err((
        status,
        Json(ApiError {
            error: error.to_string(),
        }),
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/chain - chain summary
pub async fn get_chain_info(State(state): State<ApiState>) -> Json<ChainInfo> {
    let ledger = state.ledger.read().await;
    let pool = state.pool.read().await;

    Json(ChainInfo {
        height: ledger.height(),
        latest_hash: ledger.latest_block().hash.clone(),
        next_difficulty: ledger.next_difficulty(),
        accumulated_work: ledger.accumulated_work(),
        pending_transactions: pool.len(),
    })
}

/// GET /api/blocks - the full chain
pub async fn get_blocks(State(state): State<ApiState>) -> Json<Vec<Block>> {
    let ledger = state.ledger.read().await;
    Json(ledger.blocks().to_vec())
}

/// GET /api/blocks/latest - the tail block
pub async fn get_latest_block(State(state): State<ApiState>) -> Json<Block> {
    let ledger = state.ledger.read().await;
    Json(ledger.latest_block().clone())
}

/// GET /api/blocks/index/{index} - block by height
pub async fn get_block_by_index(
    State(state): State<ApiState>,
    Path(index): Path<u64>,
) -> ApiResult<Block> {
    let ledger = state.ledger.read().await;
    match ledger.get_block_by_index(index) {
        Some(block) => Ok(Json(block.clone())),
        None => reject(StatusCode::NOT_FOUND, format!("no block at index {}", index)),
    }
}

/// GET /api/blocks/hash/{hash} - block by hash
pub async fn get_block_by_hash(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> ApiResult<Block> {
    let ledger = state.ledger.read().await;
    match ledger.get_block_by_hash(&hash) {
        Some(block) => Ok(Json(block.clone())),
        None => reject(StatusCode::NOT_FOUND, format!("no block with hash {}", hash)),
    }
}

/// GET /api/transactions/{id} - transaction by id, mined or pending
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Transaction> {
    let ledger = state.ledger.read().await;
    if let Some(tx) = ledger.get_transaction_by_id(&id) {
        return Ok(Json(tx.clone()));
    }
    drop(ledger);

    let pool = state.pool.read().await;
    match pool.snapshot().into_iter().find(|tx| tx.id == id) {
        Some(tx) => Ok(Json(tx)),
        None => reject(StatusCode::NOT_FOUND, format!("no transaction {}", id)),
    }
}

/// GET /api/address/{address}/unspent - spendable outputs
pub async fn get_unspent(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<Vec<UnspentTxOut>> {
    let ledger = state.ledger.read().await;
    Json(ledger.unspent_for(&address))
}

/// GET /api/address/{address}/balance - spendable total
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let ledger = state.ledger.read().await;
    let unspent = ledger.unspent_for(&address);

    Json(BalanceResponse {
        balance: unspent.iter().map(|u| u.amount).sum(),
        utxo_count: unspent.len(),
        address,
    })
}

/// GET /api/pool - pending transactions
pub async fn get_pool(State(state): State<ApiState>) -> Json<Vec<Transaction>> {
    let pool = state.pool.read().await;
    Json(pool.snapshot())
}

/// POST /api/transactions - submit a signed transaction
pub async fn submit_transaction(
    State(state): State<ApiState>,
    Json(tx): Json<Transaction>,
) -> ApiResult<Transaction> {
    match state.sync.submit_transaction(tx.clone()).await {
        Ok(()) => Ok(Json(tx)),
        Err(e @ (PoolError::Duplicate { .. } | PoolError::Conflict { .. })) => {
            reject(StatusCode::CONFLICT, e)
        }
        Err(e) => reject(StatusCode::BAD_REQUEST, e),
    }
}

/// POST /api/mine - assemble a candidate from the pool and mine it
pub async fn mine_block(
    State(state): State<ApiState>,
    Json(request): Json<MineRequest>,
) -> ApiResult<Block> {
    if !is_valid_address(&request.reward_address) {
        return reject(StatusCode::BAD_REQUEST, "malformed reward address");
    }
    let fee_address = request
        .fee_address
        .unwrap_or_else(|| request.reward_address.clone());
    if !is_valid_address(&fee_address) {
        return reject(StatusCode::BAD_REQUEST, "malformed fee address");
    }

    let miner = Miner::new(&request.reward_address, &fee_address);
    let candidate = {
        let ledger = state.ledger.read().await;
        let pool = state.pool.read().await;
        miner.assemble_candidate(&ledger, &pool.snapshot(), Utc::now().timestamp())
    };

    let mined = MiningTask::spawn(candidate).join().await;
    let Some(block) = mined else {
        return reject(StatusCode::SERVICE_UNAVAILABLE, "no block produced");
    };

    match state.sync.submit_block(block.clone()).await {
        Ok(()) => Ok(Json(block)),
        // the tip moved while we were searching; normal outcome
        Err(e) => reject(StatusCode::CONFLICT, e),
    }
}

/// GET /api/peers - connected peer addresses
pub async fn get_peers(State(state): State<ApiState>) -> Json<Vec<String>> {
    let addrs = state.node.peer_addrs().await;
    Json(addrs.iter().map(|a| a.to_string()).collect())
}

/// POST /api/peers - connect to a new peer
pub async fn connect_peer(
    State(state): State<ApiState>,
    Json(request): Json<ConnectPeerRequest>,
) -> ApiResult<Vec<String>> {
    if let Err(e) = state.node.connect(&request.address).await {
        return reject(StatusCode::BAD_GATEWAY, e);
    }
    let addrs = state.node.peer_addrs().await;
    Ok(Json(addrs.iter().map(|a| a.to_string()).collect()))
}

/// GET /health - liveness probe
pub async fn health_check() -> &'static str {
    "ok"
}
