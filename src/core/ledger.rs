//! Ledger store
//!
//! Owns the ordered block list and the current UTXO set as one
//! consistent unit. Blocks and the UTXO set are never updated
//! independently: a block is appended together with the UTXO delta it
//! produces, and chain replacement swaps both wholesale after a full
//! replay from genesis.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::core::utxo::{UnspentTxOut, UtxoSet};
use crate::core::validation::{
    validate_block, validate_block_transactions, ValidationError,
};
use chrono::Utc;
use thiserror::Error;

/// Default required leading zero bits for early blocks
pub const DEFAULT_INITIAL_DIFFICULTY: u32 = 16;

/// Number of blocks between difficulty retargets
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Target seconds between blocks
pub const TARGET_BLOCK_SECS: i64 = 10;

/// Upper bound on the difficulty schedule
pub const MAX_DIFFICULTY: u32 = 32;

/// Maximum pool transactions selected into one block
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 25;

/// Consensus parameters shared by mining and validation
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub initial_difficulty: u32,
    pub adjustment_interval: u64,
    pub target_block_secs: i64,
    pub max_block_transactions: usize,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            initial_difficulty: DEFAULT_INITIAL_DIFFICULTY,
            adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_block_secs: TARGET_BLOCK_SECS,
            max_block_transactions: MAX_TRANSACTIONS_PER_BLOCK,
        }
    }
}

/// Ledger-level errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Candidate chain is empty")]
    EmptyChain,
    #[error("Candidate chain has a different genesis block")]
    BadGenesis,
    #[error("Candidate chain is not heavier than the current chain ({candidate} <= {current})")]
    NotHeavier { candidate: u128, current: u128 },
}

/// The ledger: ordered blocks plus the UTXO set they produce
pub struct Ledger {
    params: ChainParams,
    blocks: Vec<Block>,
    utxo_set: UtxoSet,
}

impl Ledger {
    /// Create a ledger holding only the genesis block
    pub fn new(params: ChainParams) -> Self {
        Self {
            params,
            blocks: vec![Block::genesis()],
            utxo_set: UtxoSet::new(),
        }
    }

    /// Reconstruct a ledger from persisted blocks, revalidating the
    /// whole chain. Used at startup before any network or mining
    /// activity begins.
    pub fn from_blocks(params: ChainParams, blocks: Vec<Block>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(params);
        if blocks.len() <= 1 {
            if let Some(first) = blocks.first() {
                if *first != Block::genesis() {
                    return Err(LedgerError::BadGenesis);
                }
            }
            return Ok(ledger);
        }
        ledger.replace_chain(blocks)?;
        Ok(ledger)
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// All blocks, genesis first
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The chain tail
    pub fn latest_block(&self) -> &Block {
        self.blocks.last().expect("chain always holds genesis")
    }

    /// Height of the tail block
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    /// The current UTXO set
    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn get_block_by_index(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// Find a transaction anywhere in the chain
    pub fn get_transaction_by_id(&self, id: &str) -> Option<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| tx.id == id)
    }

    /// Unspent outputs payable to an address
    pub fn unspent_for(&self, address: &str) -> Vec<UnspentTxOut> {
        self.utxo_set.unspent_for(address)
    }

    /// Spendable balance of an address
    pub fn balance(&self, address: &str) -> u64 {
        self.utxo_set.balance(address)
    }

    /// Difficulty the schedule prescribes for the next block
    pub fn next_difficulty(&self) -> u32 {
        expected_difficulty(&self.blocks, &self.params)
    }

    /// Accumulated proof-of-work weight of the current chain
    pub fn accumulated_work(&self) -> u128 {
        chain_work(&self.blocks)
    }

    /// Validate and append a block, swapping in the UTXO set it
    /// produces. On any failure the ledger is unchanged.
    pub fn add_block(&mut self, block: Block) -> Result<(), LedgerError> {
        let now = Utc::now().timestamp();
        let expected = expected_difficulty(&self.blocks, &self.params);

        validate_block(&block, self.latest_block(), expected, now)?;
        validate_block_transactions(&block.transactions, &self.utxo_set, block.index)?;
        let new_set = self.utxo_set.apply(&block.transactions)?;

        log::info!(
            "Block {} added: {} ({} transactions)",
            block.index,
            block.hash,
            block.transactions.len()
        );
        self.blocks.push(block);
        self.utxo_set = new_set;
        Ok(())
    }

    /// Replace the whole chain with a heavier candidate.
    ///
    /// The candidate is replayed from its genesis, recomputing the UTXO
    /// set block by block; any validation failure rejects the entire
    /// candidate and leaves the ledger unchanged.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), LedgerError> {
        let first = candidate.first().ok_or(LedgerError::EmptyChain)?;
        if *first != Block::genesis() {
            return Err(LedgerError::BadGenesis);
        }

        let candidate_work = chain_work(&candidate);
        let current_work = self.accumulated_work();
        if candidate_work <= current_work {
            return Err(LedgerError::NotHeavier {
                candidate: candidate_work,
                current: current_work,
            });
        }

        let now = Utc::now().timestamp();
        let mut utxo = UtxoSet::new();
        for i in 1..candidate.len() {
            let block = &candidate[i];
            let expected = expected_difficulty(&candidate[..i], &self.params);
            validate_block(block, &candidate[i - 1], expected, now)?;
            validate_block_transactions(&block.transactions, &utxo, block.index)?;
            utxo = utxo.apply(&block.transactions)?;
        }

        log::info!(
            "Replacing chain: height {} -> {}, work {} -> {}",
            self.height(),
            candidate.len() as u64 - 1,
            current_work,
            candidate_work
        );
        self.blocks = candidate;
        self.utxo_set = utxo;
        Ok(())
    }
}

/// Difficulty prescribed for the block following `blocks`.
///
/// Retargets every `adjustment_interval` blocks by comparing the time
/// the last window took against the expected window duration; otherwise
/// the previous block's difficulty carries forward. Pure function of
/// the chain prefix, so mining and validation always agree.
pub fn expected_difficulty(blocks: &[Block], params: &ChainParams) -> u32 {
    let next_index = blocks.len() as u64;
    if next_index <= 1 {
        return params.initial_difficulty;
    }

    let previous = &blocks[blocks.len() - 1];
    if next_index % params.adjustment_interval != 0 {
        return previous.difficulty;
    }

    let window_start = &blocks[blocks.len() - params.adjustment_interval as usize];
    let time_taken = previous.timestamp - window_start.timestamp;
    let time_expected = params.target_block_secs * params.adjustment_interval as i64;

    if time_taken < time_expected / 2 {
        previous.difficulty.saturating_add(1).min(MAX_DIFFICULTY)
    } else if time_taken > time_expected * 2 {
        previous.difficulty.saturating_sub(1).max(1)
    } else {
        previous.difficulty
    }
}

fn chain_work(blocks: &[Block]) -> u128 {
    blocks.iter().map(|b| b.work()).sum()
}
