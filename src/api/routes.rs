//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Chain
        .route("/api/chain", get(handlers::get_chain_info))
        .route("/api/blocks", get(handlers::get_blocks))
        .route("/api/blocks/latest", get(handlers::get_latest_block))
        .route("/api/blocks/index/{index}", get(handlers::get_block_by_index))
        .route("/api/blocks/hash/{hash}", get(handlers::get_block_by_hash))
        // Transactions
        .route("/api/transactions", post(handlers::submit_transaction))
        .route("/api/transactions/{id}", get(handlers::get_transaction))
        .route("/api/pool", get(handlers::get_pool))
        // Addresses
        .route("/api/address/{address}/unspent", get(handlers::get_unspent))
        .route("/api/address/{address}/balance", get(handlers::get_balance))
        // Mining
        .route("/api/mine", post(handlers::mine_block))
        // Peers
        .route("/api/peers", get(handlers::get_peers))
        .route("/api/peers", post(handlers::connect_peer))
        .layer(cors)
        .with_state(state)
}
