//! Transaction pool
//!
//! Holding area for transactions that have not been mined yet.
//! Admission is gated on validity against the current UTXO set and on
//! the absence of input conflicts with already-pooled transactions
//! (first submission wins). The pool never reorders or mutates stored
//! transactions; it only shrinks when the ledger's UTXO set changes.

use crate::core::{validate_transaction, Transaction, UtxoSet, ValidationError};
use thiserror::Error;

/// Pool admission errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Transaction validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Transaction '{tx_id}' is already in the pool")]
    Duplicate { tx_id: String },
    #[error("Input {tx_id}:{output_index} is already spent by a pooled transaction")]
    Conflict { tx_id: String, output_index: u64 },
}

/// Pending transactions, in admission order
#[derive(Debug, Default)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction.
    ///
    /// Rejects duplicates, transactions that fail validation against
    /// the given UTXO snapshot, and transactions whose inputs are
    /// already referenced by a pooled transaction.
    pub fn add(&mut self, tx: Transaction, utxo: &UtxoSet) -> Result<(), PoolError> {
        if self.contains(&tx.id) {
            return Err(PoolError::Duplicate { tx_id: tx.id });
        }

        validate_transaction(&tx, utxo)?;

        for input in &tx.inputs {
            if self.spends(&input.tx_id, input.output_index) {
                return Err(PoolError::Conflict {
                    tx_id: input.tx_id.clone(),
                    output_index: input.output_index,
                });
            }
        }

        log::debug!("Transaction {} admitted to pool", tx.id);
        self.transactions.push(tx);
        Ok(())
    }

    /// Drop every pooled transaction that references an input no longer
    /// present in the new UTXO set. Called after any ledger mutation.
    pub fn prune(&mut self, utxo: &UtxoSet) {
        let before = self.transactions.len();
        self.transactions.retain(|tx| {
            tx.inputs
                .iter()
                .all(|input| utxo.contains(&input.tx_id, input.output_index))
        });
        let removed = before - self.transactions.len();
        if removed > 0 {
            log::info!("Pruned {} stale transactions from pool", removed);
        }
    }

    /// Snapshot of all pending transactions, in admission order
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Whether a transaction id is pooled
    pub fn contains(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }

    /// Whether any pooled transaction spends the given outpoint
    fn spends(&self, tx_id: &str, output_index: u64) -> bool {
        self.transactions.iter().any(|tx| {
            tx.inputs
                .iter()
                .any(|i| i.tx_id == tx_id && i.output_index == output_index)
        })
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxIn, TxOut, BLOCK_REWARD};
    use crate::crypto::KeyPair;

    fn funded_set(kp: &KeyPair) -> (UtxoSet, Transaction) {
        let reward = Transaction::reward(&kp.address(), 1);
        let set = UtxoSet::new().apply(std::slice::from_ref(&reward)).unwrap();
        (set, reward)
    }

    fn signed_spend(kp: &KeyPair, source_id: &str, to: &str) -> Transaction {
        let mut tx = Transaction::new_regular(
            vec![TxIn {
                tx_id: source_id.to_string(),
                output_index: 0,
                signature: String::new(),
            }],
            vec![TxOut {
                address: to.to_string(),
                amount: BLOCK_REWARD,
            }],
        );
        tx.sign(kp).unwrap();
        tx
    }

    #[test]
    fn test_add_and_snapshot() {
        let kp = KeyPair::generate();
        let (utxo, reward) = funded_set(&kp);
        let mut pool = TransactionPool::new();

        let tx = signed_spend(&kp, &reward.id, &KeyPair::generate().address());
        pool.add(tx.clone(), &utxo).unwrap();

        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&tx.id));
        assert_eq!(pool.snapshot(), vec![tx]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let kp = KeyPair::generate();
        let (utxo, reward) = funded_set(&kp);
        let mut pool = TransactionPool::new();

        let tx = signed_spend(&kp, &reward.id, &KeyPair::generate().address());
        pool.add(tx.clone(), &utxo).unwrap();

        let err = pool.add(tx, &utxo).unwrap_err();
        assert!(matches!(err, PoolError::Duplicate { .. }));
    }

    #[test]
    fn test_conflicting_input_rejected_first_wins() {
        let kp = KeyPair::generate();
        let (utxo, reward) = funded_set(&kp);
        let mut pool = TransactionPool::new();

        // two valid transactions spending the same output; whichever is
        // submitted first wins regardless of content
        let tx1 = signed_spend(&kp, &reward.id, &KeyPair::generate().address());
        let tx2 = signed_spend(&kp, &reward.id, &KeyPair::generate().address());

        pool.add(tx1.clone(), &utxo).unwrap();
        let err = pool.add(tx2, &utxo).unwrap_err();
        assert!(matches!(err, PoolError::Conflict { .. }));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&tx1.id));
    }

    #[test]
    fn test_invalid_transaction_rejected() {
        let kp = KeyPair::generate();
        let utxo = UtxoSet::new();
        let mut pool = TransactionPool::new();

        // spends an output that does not exist
        let tx = signed_spend(&kp, &"a".repeat(64), &kp.address());
        let err = pool.add(tx, &utxo).unwrap_err();
        assert!(matches!(
            err,
            PoolError::Validation(ValidationError::UnknownUtxo { .. })
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_prune_drops_consumed_inputs() {
        let kp = KeyPair::generate();
        let (utxo, reward) = funded_set(&kp);
        let mut pool = TransactionPool::new();

        let tx = signed_spend(&kp, &reward.id, &KeyPair::generate().address());
        pool.add(tx.clone(), &utxo).unwrap();

        // the referenced output gets consumed by a mined block
        let after = utxo.apply(&[tx]).unwrap();
        pool.prune(&after);

        assert!(pool.is_empty());
    }
}
