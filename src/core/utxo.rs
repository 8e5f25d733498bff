//! Unspent transaction output set
//!
//! The UTXO set is the materialized view of spendable value: one entry
//! per output that no transaction in the chain has consumed. Updates
//! are all-or-nothing; a batch that references a missing output leaves
//! the set untouched.

use crate::core::transaction::Transaction;
use crate::core::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Key of a UTXO entry: the producing transaction and output position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub tx_id: String,
    pub output_index: u64,
}

impl OutPoint {
    pub fn new(tx_id: &str, output_index: u64) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            output_index,
        }
    }
}

/// A spendable output together with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentTxOut {
    pub tx_id: String,
    pub output_index: u64,
    pub address: String,
    pub amount: u64,
}

/// The set of all currently unspent outputs
#[derive(Debug, Clone, Default)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, UnspentTxOut>,
}

impl UtxoSet {
    /// The empty set (state before genesis)
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry by outpoint
    pub fn get(&self, tx_id: &str, output_index: u64) -> Option<&UnspentTxOut> {
        self.entries.get(&OutPoint::new(tx_id, output_index))
    }

    /// Whether an outpoint is currently spendable
    pub fn contains(&self, tx_id: &str, output_index: u64) -> bool {
        self.entries.contains_key(&OutPoint::new(tx_id, output_index))
    }

    /// All unspent outputs payable to an address
    pub fn unspent_for(&self, address: &str) -> Vec<UnspentTxOut> {
        self.entries
            .values()
            .filter(|utxo| utxo.address == address)
            .cloned()
            .collect()
    }

    /// Total spendable amount for an address
    pub fn balance(&self, address: &str) -> u64 {
        self.entries
            .values()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.amount)
            .sum()
    }

    /// Number of entries in the set
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = &UnspentTxOut> {
        self.entries.values()
    }

    /// Derive the set after one block's transaction batch.
    ///
    /// Every non-placeholder input must reference an entry of this set,
    /// and no outpoint may be consumed twice within the batch; both are
    /// checked before any mutation. All transactions in the batch spend
    /// from this snapshot, never from each other's outputs.
    pub fn apply(&self, transactions: &[Transaction]) -> Result<UtxoSet, ValidationError> {
        let mut consumed: HashSet<OutPoint> = HashSet::new();

        for tx in transactions {
            for input in &tx.inputs {
                if input.is_placeholder() {
                    continue;
                }
                let outpoint = OutPoint::new(&input.tx_id, input.output_index);
                if !self.entries.contains_key(&outpoint) {
                    return Err(ValidationError::UnknownUtxo {
                        tx_id: input.tx_id.clone(),
                        output_index: input.output_index,
                    });
                }
                if !consumed.insert(outpoint) {
                    return Err(ValidationError::DoubleSpend {
                        tx_id: input.tx_id.clone(),
                        output_index: input.output_index,
                    });
                }
            }
        }

        let mut entries = self.entries.clone();
        for outpoint in &consumed {
            entries.remove(outpoint);
        }
        for tx in transactions {
            for (index, output) in tx.outputs.iter().enumerate() {
                entries.insert(
                    OutPoint::new(&tx.id, index as u64),
                    UnspentTxOut {
                        tx_id: tx.id.clone(),
                        output_index: index as u64,
                        address: output.address.clone(),
                        amount: output.amount,
                    },
                );
            }
        }

        Ok(UtxoSet { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{TxIn, TxOut, BLOCK_REWARD};
    use crate::crypto::KeyPair;

    fn spend(tx_id: &str, output_index: u64, to: &str, amount: u64) -> Transaction {
        Transaction::new_regular(
            vec![TxIn {
                tx_id: tx_id.to_string(),
                output_index,
                signature: String::new(),
            }],
            vec![TxOut {
                address: to.to_string(),
                amount,
            }],
        )
    }

    #[test]
    fn test_apply_adds_coinbase_outputs() {
        let kp = KeyPair::generate();
        let reward = Transaction::reward(&kp.address(), 1);

        let set = UtxoSet::new().apply(&[reward.clone()]).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.balance(&kp.address()), BLOCK_REWARD);
        assert!(set.contains(&reward.id, 0));
    }

    #[test]
    fn test_apply_consumes_inputs() {
        let kp = KeyPair::generate();
        let recipient = KeyPair::generate();
        let reward = Transaction::reward(&kp.address(), 1);
        let set = UtxoSet::new().apply(&[reward.clone()]).unwrap();

        let tx = spend(&reward.id, 0, &recipient.address(), BLOCK_REWARD);
        let set = set.apply(&[tx.clone()]).unwrap();

        assert!(!set.contains(&reward.id, 0));
        assert_eq!(set.balance(&kp.address()), 0);
        assert_eq!(set.balance(&recipient.address()), BLOCK_REWARD);
        assert!(set.contains(&tx.id, 0));
    }

    #[test]
    fn test_apply_rejects_unknown_input() {
        let kp = KeyPair::generate();
        let tx = spend(&"a".repeat(64), 0, &kp.address(), 5);

        let err = UtxoSet::new().apply(&[tx]).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownUtxo { .. }));
    }

    #[test]
    fn test_apply_rejects_intra_batch_double_spend() {
        let kp = KeyPair::generate();
        let reward = Transaction::reward(&kp.address(), 1);
        let set = UtxoSet::new().apply(&[reward.clone()]).unwrap();

        let tx1 = spend(&reward.id, 0, &kp.address(), BLOCK_REWARD);
        let tx2 = spend(&reward.id, 0, &KeyPair::generate().address(), BLOCK_REWARD);

        let err = set.apply(&[tx1, tx2]).unwrap_err();
        assert!(matches!(err, ValidationError::DoubleSpend { .. }));
        // the failed apply left the original set untouched
        assert!(set.contains(&reward.id, 0));
    }
}
