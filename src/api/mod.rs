//! REST API
//!
//! HTTP boundary exposing ledger state to callers.
//!
//! # Endpoints
//!
//! ## Chain
//! - `GET /api/chain` - chain summary
//! - `GET /api/blocks` - full chain
//! - `GET /api/blocks/latest` - tail block
//! - `GET /api/blocks/index/{index}` - block by height
//! - `GET /api/blocks/hash/{hash}` - block by hash
//!
//! ## Transactions
//! - `POST /api/transactions` - submit a signed transaction
//! - `GET /api/transactions/{id}` - transaction by id
//! - `GET /api/pool` - pending transactions
//!
//! ## Addresses
//! - `GET /api/address/{address}/unspent` - spendable outputs
//! - `GET /api/address/{address}/balance` - spendable total
//!
//! ## Mining & peers
//! - `POST /api/mine` - mine one block to the given addresses
//! - `GET /api/peers` / `POST /api/peers` - list / connect peers

pub mod handlers;
pub mod routes;

pub use handlers::ApiState;
pub use routes::create_router;
