//! Chain persistence

pub mod chain_store;

pub use chain_store::{ChainStore, StorageError};
