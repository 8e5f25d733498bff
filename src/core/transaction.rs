//! Transaction model
//!
//! Value transfers in the ledger follow a UTXO model: every Regular
//! transaction consumes previously unspent outputs and produces new
//! ones. Reward and Fee transactions are coinbase-style: they carry a
//! single placeholder input binding them to a block index and mint
//! their single output.

use crate::crypto::{sha256_hex, KeyError, KeyPair};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reward minted by every block's Reward transaction
pub const BLOCK_REWARD: u64 = 50;

/// Fee minted per Regular transaction included in a block
pub const FEE_PER_TRANSACTION: u64 = 1;

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Cannot sign a coinbase transaction")]
    SignCoinbase,
}

/// The three transaction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Regular,
    Fee,
    Reward,
}

/// Transaction input: a reference to a previously unspent output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Id of the transaction that produced the referenced output
    pub tx_id: String,
    /// Position of the output in that transaction.
    /// For coinbase placeholder inputs this encodes the block index.
    pub output_index: u64,
    /// Signature over the spending transaction's id, proving ownership
    /// of the referenced output's address
    pub signature: String,
}

impl TxIn {
    /// Placeholder input used by Reward and Fee transactions
    pub fn coinbase(block_index: u64) -> Self {
        Self {
            tx_id: String::new(),
            output_index: block_index,
            signature: String::new(),
        }
    }

    /// True for the placeholder inputs of coinbase transactions
    pub fn is_placeholder(&self) -> bool {
        self.tx_id.is_empty()
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Recipient address (compressed public key hex)
    pub address: String,
    /// Amount of coins
    pub amount: u64,
}

/// A ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Id derived deterministically from type, inputs and outputs
    pub id: String,
    /// Transaction kind
    pub tx_type: TxType,
    /// Inputs (one placeholder for coinbase kinds)
    pub inputs: Vec<TxIn>,
    /// Outputs (exactly one for coinbase kinds)
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    /// Create an unsigned Regular transaction
    pub fn new_regular(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        let mut tx = Self {
            id: String::new(),
            tx_type: TxType::Regular,
            inputs,
            outputs,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Create the Reward transaction for a block
    pub fn reward(address: &str, block_index: u64) -> Self {
        let mut tx = Self {
            id: String::new(),
            tx_type: TxType::Reward,
            inputs: vec![TxIn::coinbase(block_index)],
            outputs: vec![TxOut {
                address: address.to_string(),
                amount: BLOCK_REWARD,
            }],
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Create the Fee transaction collecting fees for `regular_count`
    /// Regular transactions in a block
    pub fn fee(address: &str, block_index: u64, regular_count: usize) -> Self {
        let mut tx = Self {
            id: String::new(),
            tx_type: TxType::Fee,
            inputs: vec![TxIn::coinbase(block_index)],
            outputs: vec![TxOut {
                address: address.to_string(),
                amount: FEE_PER_TRANSACTION * regular_count as u64,
            }],
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Derive the transaction id from type, inputs and outputs.
    /// Signatures are excluded so the id is stable across signing.
    pub fn compute_id(&self) -> String {
        let type_tag = match self.tx_type {
            TxType::Regular => "regular",
            TxType::Fee => "fee",
            TxType::Reward => "reward",
        };

        let input_content: String = self
            .inputs
            .iter()
            .map(|txin| format!("{}{}", txin.tx_id, txin.output_index))
            .collect();

        let output_content: String = self
            .outputs
            .iter()
            .map(|txout| format!("{}{}", txout.address, txout.amount))
            .collect();

        sha256_hex(format!("{}{}{}", type_tag, input_content, output_content).as_bytes())
    }

    /// Whether this is a coinbase-style (Fee or Reward) transaction
    pub fn is_coinbase(&self) -> bool {
        matches!(self.tx_type, TxType::Fee | TxType::Reward)
    }

    /// Total amount across all outputs
    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    /// Sign every input with the given key pair; the signed message is
    /// the transaction id
    pub fn sign(&mut self, key_pair: &KeyPair) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Err(TransactionError::SignCoinbase);
        }

        let signature = hex::encode(key_pair.sign(self.id.as_bytes())?);
        for input in &mut self.inputs {
            input.signature = signature.clone();
        }
        Ok(())
    }
}
