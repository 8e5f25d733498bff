//! Miner
//!
//! Assembles candidate blocks from the pool plus reward/fee coinbases
//! and searches for a nonce satisfying the difficulty target. The
//! search is CPU-bound and unbounded in the worst case, so it runs as a
//! cancellable blocking task, never on a connection-handling thread.
//! Mining has no side effects: the found block is only a value until
//! the caller submits it to the ledger, which revalidates it.

use crate::core::{Block, Ledger, Transaction};
use chrono::Utc;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Nonces tried between cancellation checks and timestamp refreshes
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Assembles candidates and spawns proof-of-work searches
pub struct Miner {
    /// Address receiving the block reward
    pub reward_address: String,
    /// Address receiving the per-transaction fees
    pub fee_address: String,
}

impl Miner {
    pub fn new(reward_address: &str, fee_address: &str) -> Self {
        Self {
            reward_address: reward_address.to_string(),
            fee_address: fee_address.to_string(),
        }
    }

    /// Assemble an unmined candidate block on top of the ledger tail.
    ///
    /// Pool transactions are selected in order, up to the configured
    /// maximum, skipping any transaction whose inputs are unknown to
    /// the current UTXO set or already consumed earlier in this
    /// selection batch. A Fee coinbase is added when any regular
    /// transactions were selected; the Reward coinbase always comes
    /// first, bound to the candidate's index.
    pub fn assemble_candidate(
        &self,
        ledger: &Ledger,
        pool_transactions: &[Transaction],
        now: i64,
    ) -> Block {
        let tip = ledger.latest_block();
        let index = tip.index + 1;
        let max = ledger.params().max_block_transactions;

        let mut used: HashSet<(String, u64)> = HashSet::new();
        let mut selected: Vec<Transaction> = Vec::new();

        for tx in pool_transactions {
            if selected.len() >= max {
                break;
            }
            let spendable = tx.inputs.iter().all(|input| {
                ledger.utxo_set().contains(&input.tx_id, input.output_index)
                    && !used.contains(&(input.tx_id.clone(), input.output_index))
            });
            if !spendable {
                log::debug!("Skipping unmineable transaction {}", tx.id);
                continue;
            }
            for input in &tx.inputs {
                used.insert((input.tx_id.clone(), input.output_index));
            }
            selected.push(tx.clone());
        }

        let mut transactions = vec![Transaction::reward(&self.reward_address, index)];
        if !selected.is_empty() {
            transactions.push(Transaction::fee(&self.fee_address, index, selected.len()));
        }
        transactions.extend(selected);

        Block::new(
            index,
            tip.hash.clone(),
            now,
            ledger.next_difficulty(),
            transactions,
        )
    }
}

/// A proof-of-work search running on a blocking worker
pub struct MiningTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<Option<Block>>,
}

impl MiningTask {
    /// Start searching for a nonce for the candidate block
    pub fn spawn(candidate: Block) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || find_nonce(candidate, token));
        Self { cancel, handle }
    }

    /// Abandon the search; the task returns `None` without committing
    /// any side effect
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this search, usable after the task itself
    /// has been consumed by `join`
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the search to finish. `None` means the search was
    /// cancelled — absence of a block is a normal outcome, not a fault.
    pub async fn join(self) -> Option<Block> {
        self.handle.await.unwrap_or(None)
    }
}

/// Increment the nonce until the block hash satisfies its difficulty.
///
/// The timestamp is refreshed periodically so long searches keep
/// producing current blocks. Returns `None` once the cancellation
/// token fires.
fn find_nonce(mut block: Block, cancel: CancellationToken) -> Option<Block> {
    let started = std::time::Instant::now();
    let mut attempts: u64 = 0;

    loop {
        if attempts % CANCEL_CHECK_INTERVAL == 0 {
            if cancel.is_cancelled() {
                log::debug!(
                    "Mining of block {} abandoned after {} attempts",
                    block.index,
                    attempts
                );
                return None;
            }
            block.timestamp = Utc::now().timestamp();
        }

        block.hash = block.compute_hash();
        if block.has_valid_pow() {
            log::info!(
                "Block {} mined in {}ms ({} attempts, difficulty {})",
                block.index,
                started.elapsed().as_millis(),
                attempts,
                block.difficulty
            );
            return Some(block);
        }

        block.nonce = block.nonce.wrapping_add(1);
        attempts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChainParams, TxIn, TxOut, BLOCK_REWARD, FEE_PER_TRANSACTION};
    use crate::crypto::KeyPair;

    fn test_ledger() -> Ledger {
        Ledger::new(ChainParams {
            initial_difficulty: 4,
            ..ChainParams::default()
        })
    }

    fn miner() -> (Miner, KeyPair, KeyPair) {
        let reward_kp = KeyPair::generate();
        let fee_kp = KeyPair::generate();
        let miner = Miner::new(&reward_kp.address(), &fee_kp.address());
        (miner, reward_kp, fee_kp)
    }

    #[test]
    fn test_candidate_with_empty_pool() {
        let ledger = test_ledger();
        let (miner, reward_kp, _) = miner();

        let candidate = miner.assemble_candidate(&ledger, &[], Utc::now().timestamp());

        assert_eq!(candidate.index, 1);
        assert_eq!(candidate.previous_hash, ledger.latest_block().hash);
        assert_eq!(candidate.nonce, 0);
        assert_eq!(candidate.transactions.len(), 1);
        assert_eq!(candidate.transactions[0].outputs[0].address, reward_kp.address());
        assert_eq!(candidate.transactions[0].total_output(), BLOCK_REWARD);
    }

    #[test]
    fn test_candidate_includes_fee_for_selected() {
        let mut ledger = test_ledger();
        let kp = KeyPair::generate();
        let (miner, _, fee_kp) = miner();

        // fund kp with one mined reward
        let reward = Transaction::reward(&kp.address(), 1);
        let mut block = Block::new(
            1,
            ledger.latest_block().hash.clone(),
            Utc::now().timestamp(),
            ledger.next_difficulty(),
            vec![reward.clone()],
        );
        loop {
            block.hash = block.compute_hash();
            if block.has_valid_pow() {
                break;
            }
            block.nonce += 1;
        }
        ledger.add_block(block).unwrap();

        let mut tx = Transaction::new_regular(
            vec![TxIn {
                tx_id: reward.id.clone(),
                output_index: 0,
                signature: String::new(),
            }],
            vec![TxOut {
                address: kp.address(),
                amount: BLOCK_REWARD,
            }],
        );
        tx.sign(&kp).unwrap();

        let candidate =
            miner.assemble_candidate(&ledger, &[tx.clone()], Utc::now().timestamp());

        assert_eq!(candidate.transactions.len(), 3);
        let fee_tx = &candidate.transactions[1];
        assert_eq!(fee_tx.outputs[0].address, fee_kp.address());
        assert_eq!(fee_tx.total_output(), FEE_PER_TRANSACTION);
        assert_eq!(candidate.transactions[2], tx);
    }

    #[test]
    fn test_selection_skips_batch_double_spend() {
        let mut ledger = test_ledger();
        let kp = KeyPair::generate();
        let (miner, _, _) = miner();

        let reward = Transaction::reward(&kp.address(), 1);
        let mut block = Block::new(
            1,
            ledger.latest_block().hash.clone(),
            Utc::now().timestamp(),
            ledger.next_difficulty(),
            vec![reward.clone()],
        );
        loop {
            block.hash = block.compute_hash();
            if block.has_valid_pow() {
                break;
            }
            block.nonce += 1;
        }
        ledger.add_block(block).unwrap();

        let spend = |to: &str| {
            let mut tx = Transaction::new_regular(
                vec![TxIn {
                    tx_id: reward.id.clone(),
                    output_index: 0,
                    signature: String::new(),
                }],
                vec![TxOut {
                    address: to.to_string(),
                    amount: BLOCK_REWARD,
                }],
            );
            tx.sign(&kp).unwrap();
            tx
        };

        let tx1 = spend(&KeyPair::generate().address());
        let tx2 = spend(&KeyPair::generate().address());

        let candidate = miner.assemble_candidate(
            &ledger,
            &[tx1.clone(), tx2],
            Utc::now().timestamp(),
        );

        // reward + fee + exactly one of the two conflicting spends
        assert_eq!(candidate.transactions.len(), 3);
        assert_eq!(candidate.transactions[2], tx1);
    }

    #[tokio::test]
    async fn test_mining_finds_block_at_low_difficulty() {
        let ledger = test_ledger();
        let (miner, _, _) = miner();

        let candidate = miner.assemble_candidate(&ledger, &[], Utc::now().timestamp());
        let task = MiningTask::spawn(candidate);
        let block = task.join().await.expect("search should finish");

        assert!(block.has_valid_pow());
        assert!(block.verify_hash());
    }

    #[tokio::test]
    async fn test_mining_cancellation_yields_no_block() {
        let ledger = test_ledger();
        let (miner, _, _) = miner();

        let mut candidate = miner.assemble_candidate(&ledger, &[], Utc::now().timestamp());
        candidate.difficulty = 255; // unreachable target

        let task = MiningTask::spawn(candidate);
        task.cancel();
        assert!(task.join().await.is_none());
    }
}
