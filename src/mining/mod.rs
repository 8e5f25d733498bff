//! Mining: candidate assembly, proof-of-work search and the
//! pending-transaction pool

pub mod miner;
pub mod pool;

pub use miner::{Miner, MiningTask};
pub use pool::{PoolError, TransactionPool};
