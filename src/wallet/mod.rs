//! Wallet: key files and transaction creation

pub mod wallet;

pub use wallet::{Wallet, WalletError};
