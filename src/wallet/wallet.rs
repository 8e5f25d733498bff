//! Wallet
//!
//! Key management and Regular transaction creation. A wallet owns one
//! key pair; its address is the compressed public key. Created
//! transactions conserve value exactly: selected inputs equal the
//! recipient amount plus a change output back to the wallet.

use crate::core::{Ledger, Transaction, TransactionError, TxIn, TxOut, UnspentTxOut};
use crate::crypto::{KeyError, KeyPair};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Amount must be positive")]
    ZeroAmount,
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Serializable key file contents
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    private_key_hex: String,
    address: String,
}

/// A wallet holding one signing key
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a wallet with a fresh key pair
    pub fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Import a wallet from a hex private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        Ok(Self {
            key_pair: KeyPair::from_private_key_hex(private_key_hex)?,
        })
    }

    /// The wallet's address
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// The wallet's private key (hex). Keep this secret.
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    /// Spendable balance from the ledger's UTXO set
    pub fn balance(&self, ledger: &Ledger) -> u64 {
        ledger.balance(&self.address())
    }

    /// Unspent outputs owned by this wallet
    pub fn unspent(&self, ledger: &Ledger) -> Vec<UnspentTxOut> {
        ledger.unspent_for(&self.address())
    }

    /// Create and sign a Regular transaction sending `amount` to
    /// `recipient`. Inputs are selected until they cover the amount;
    /// any excess returns to this wallet as a change output.
    pub fn create_transaction(
        &self,
        recipient: &str,
        amount: u64,
        ledger: &Ledger,
    ) -> Result<Transaction, WalletError> {
        if amount == 0 {
            return Err(WalletError::ZeroAmount);
        }

        let utxos = self.unspent(ledger);
        let balance: u64 = utxos.iter().map(|u| u.amount).sum();
        if balance < amount {
            return Err(WalletError::InsufficientFunds {
                have: balance,
                need: amount,
            });
        }

        let mut inputs = Vec::new();
        let mut selected = 0u64;
        for utxo in utxos {
            inputs.push(TxIn {
                tx_id: utxo.tx_id.clone(),
                output_index: utxo.output_index,
                signature: String::new(),
            });
            selected += utxo.amount;
            if selected >= amount {
                break;
            }
        }

        let mut outputs = vec![TxOut {
            address: recipient.to_string(),
            amount,
        }];
        let change = selected - amount;
        if change > 0 {
            outputs.push(TxOut {
                address: self.address(),
                amount: change,
            });
        }

        let mut tx = Transaction::new_regular(inputs, outputs);
        tx.sign(&self.key_pair)?;
        Ok(tx)
    }

    /// Save the key file
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let data = KeyFile {
            private_key_hex: self.private_key(),
            address: self.address(),
        };
        let json = serde_json::to_string_pretty(&data)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a wallet from a key file
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let data: KeyFile = serde_json::from_str(&json)?;
        Self::from_private_key(&data.private_key_hex)
    }

    /// Load the key file if it exists, otherwise create and save a
    /// fresh wallet
    pub fn load_or_create(path: &Path) -> Result<Self, WalletError> {
        if path.exists() {
            Self::load(path)
        } else {
            let wallet = Self::new();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            wallet.save(path)?;
            Ok(wallet)
        }
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
