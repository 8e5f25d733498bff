//! Core ledger components
//!
//! The fundamental building blocks:
//! - Transactions (UTXO model, reward/fee coinbases)
//! - Blocks (proof of work over a fixed genesis)
//! - The UTXO set with all-or-nothing batch application
//! - Consensus validation rules
//! - The ledger store (blocks + UTXO set as one unit)

pub mod block;
pub mod ledger;
pub mod transaction;
pub mod utxo;
pub mod validation;

pub use block::{Block, GENESIS_TIMESTAMP};
pub use ledger::{
    expected_difficulty, ChainParams, Ledger, LedgerError, DEFAULT_INITIAL_DIFFICULTY,
    DIFFICULTY_ADJUSTMENT_INTERVAL, MAX_DIFFICULTY, MAX_TRANSACTIONS_PER_BLOCK, TARGET_BLOCK_SECS,
};
pub use transaction::{
    Transaction, TransactionError, TxIn, TxOut, TxType, BLOCK_REWARD, FEE_PER_TRANSACTION,
};
pub use utxo::{OutPoint, UnspentTxOut, UtxoSet};
pub use validation::{
    validate_block, validate_block_transactions, validate_fee, validate_reward,
    validate_transaction, ValidationError, TIMESTAMP_TOLERANCE_SECS,
};
