//! Block model
//!
//! A block packages an ordered list of transactions under a
//! proof-of-work header. The hash covers every other field; the
//! transaction list is covered through the transaction ids, which are
//! themselves re-derived during validation.

use crate::core::transaction::Transaction;
use crate::crypto::{hex_meets_difficulty, sha256_hex};
use serde::{Deserialize, Serialize};

/// Fixed timestamp of the genesis block (unix seconds)
pub const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height, genesis = 0
    pub index: u64,
    /// Hash of the previous block; empty for genesis
    pub previous_hash: String,
    /// Creation timestamp (unix seconds)
    pub timestamp: i64,
    /// Proof-of-work nonce
    pub nonce: u64,
    /// Required leading zero bits of the hash
    pub difficulty: u32,
    /// Ordered transactions; the Reward coinbase comes first
    pub transactions: Vec<Transaction>,
    /// Hash over all other fields
    pub hash: String,
}

impl Block {
    /// Create an unmined block (nonce 0) with its hash computed
    pub fn new(
        index: u64,
        previous_hash: String,
        timestamp: i64,
        difficulty: u32,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash,
            timestamp,
            nonce: 0,
            difficulty,
            transactions,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// The genesis block shared by every valid chain
    pub fn genesis() -> Self {
        let mut block = Self {
            index: 0,
            previous_hash: String::new(),
            timestamp: GENESIS_TIMESTAMP,
            nonce: 0,
            difficulty: 0,
            transactions: Vec::new(),
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Compute the block hash over all fields except the hash itself
    pub fn compute_hash(&self) -> String {
        let tx_ids: String = self.transactions.iter().map(|tx| tx.id.as_str()).collect();
        let data = format!(
            "{}{}{}{}{}{}",
            self.index, self.previous_hash, self.timestamp, self.nonce, self.difficulty, tx_ids
        );
        sha256_hex(data.as_bytes())
    }

    /// Verify the stored hash against a recomputation
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Check the hash against this block's own difficulty
    pub fn has_valid_pow(&self) -> bool {
        hex_meets_difficulty(&self.hash, self.difficulty)
    }

    /// Proof-of-work weight contributed by this block
    pub fn work(&self) -> u128 {
        1u128 << self.difficulty.min(127)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_genesis_is_stable() {
        let g1 = Block::genesis();
        let g2 = Block::genesis();

        assert_eq!(g1, g2);
        assert_eq!(g1.index, 0);
        assert!(g1.previous_hash.is_empty());
        assert!(g1.verify_hash());
    }

    #[test]
    fn test_hash_covers_all_fields() {
        let base = Block::genesis();

        let mut tampered = base.clone();
        tampered.nonce += 1;
        assert!(!tampered.verify_hash());

        let mut tampered = base.clone();
        tampered.timestamp += 1;
        assert!(!tampered.verify_hash());

        let mut tampered = base.clone();
        tampered.previous_hash = "00".repeat(32);
        assert!(!tampered.verify_hash());
    }

    #[test]
    fn test_hash_covers_transactions() {
        let kp = KeyPair::generate();
        let tx = Transaction::reward(&kp.address(), 1);
        let block = Block::new(1, Block::genesis().hash, GENESIS_TIMESTAMP + 10, 0, vec![tx]);

        assert!(block.verify_hash());

        let mut tampered = block.clone();
        tampered.transactions[0].id = "f".repeat(64);
        assert!(!tampered.verify_hash());
    }

    #[test]
    fn test_work_grows_with_difficulty() {
        let mut block = Block::genesis();
        block.difficulty = 8;
        assert_eq!(block.work(), 256);
        block.difficulty = 16;
        assert_eq!(block.work(), 65536);
    }
}
