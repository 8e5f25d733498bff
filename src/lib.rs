//! nanochain: a minimal peer-replicated UTXO ledger
//!
//! An append-only chain of blocks carrying value-transfer transactions,
//! validated against an unspent-output set, extended via proof-of-work
//! and reconciled across peers through a gossip protocol. Features:
//! - UTXO transaction model with ECDSA signatures (secp256k1)
//! - Reward and fee coinbases bound to their block index
//! - Leading-zero-bit proof of work with rolling retargeting
//! - Heaviest-chain fork choice with full replay on replacement
//! - Conflict-gated transaction pool
//! - Cancellable background mining
//! - TCP gossip protocol and a REST boundary
//!
//! # Example
//!
//! ```rust
//! use nanochain::core::{ChainParams, Ledger};
//! use nanochain::wallet::Wallet;
//!
//! let ledger = Ledger::new(ChainParams::default());
//! let wallet = Wallet::new();
//!
//! assert_eq!(ledger.height(), 0);
//! assert_eq!(wallet.balance(&ledger), 0);
//! ```

pub mod api;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use core::{
    Block, ChainParams, Ledger, LedgerError, Transaction, TxIn, TxOut, TxType, UnspentTxOut,
    UtxoSet, ValidationError, BLOCK_REWARD, FEE_PER_TRANSACTION,
};
pub use crypto::KeyPair;
pub use mining::{Miner, MiningTask, PoolError, TransactionPool};
pub use network::{GossipSync, Message, Node, NodeConfig, NodeHandle, PeerManager};
pub use storage::ChainStore;
pub use wallet::Wallet;
