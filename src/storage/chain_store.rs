//! Chain persistence
//!
//! On-disk layout: one JSON record per block, indexed by position, plus
//! a cursor file recording the chain length. At startup the records are
//! read back in order and replayed into a fresh ledger before any
//! network or mining activity begins.

use crate::core::Block;
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Block-record store under one data directory
pub struct ChainStore {
    data_dir: PathBuf,
}

impl ChainStore {
    /// Create a store, ensuring the data directory exists
    pub fn new(data_dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn block_path(&self, index: u64) -> PathBuf {
        self.data_dir.join(format!("block_{}.json", index))
    }

    fn cursor_path(&self) -> PathBuf {
        self.data_dir.join("length")
    }

    /// Whether a saved chain exists
    pub fn exists(&self) -> bool {
        self.cursor_path().exists()
    }

    /// Persist the whole chain: every block record, then the cursor.
    /// Records beyond the new length (after a chain replacement by a
    /// shorter-but-heavier chain) are removed.
    pub fn save(&self, blocks: &[Block]) -> Result<(), StorageError> {
        for block in blocks {
            self.write_record(block)?;
        }

        let old_len = self.read_cursor().unwrap_or(0);
        for stale in blocks.len() as u64..old_len {
            let path = self.block_path(stale);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }

        self.write_cursor(blocks.len() as u64)?;
        Ok(())
    }

    /// Load the persisted chain, or `None` when nothing was saved yet
    pub fn load(&self) -> Result<Option<Vec<Block>>, StorageError> {
        if !self.exists() {
            return Ok(None);
        }

        let length = self.read_cursor()?;
        let mut blocks = Vec::with_capacity(length as usize);

        for index in 0..length {
            let file = fs::File::open(self.block_path(index))?;
            let reader = BufReader::new(file);
            let block: Block = serde_json::from_reader(reader)?;
            if block.index != index {
                return Err(StorageError::InvalidData(format!(
                    "record {} holds block index {}",
                    index, block.index
                )));
            }
            blocks.push(block);
        }

        Ok(Some(blocks))
    }

    /// Write one block record atomically (tmp file + rename)
    fn write_record(&self, block: &Block) -> Result<(), StorageError> {
        let temp_path = self.data_dir.join(format!("block_{}.tmp", block.index));
        let file = fs::File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, block)?;
        fs::rename(&temp_path, self.block_path(block.index))?;
        Ok(())
    }

    fn read_cursor(&self) -> Result<u64, StorageError> {
        let content = fs::read_to_string(self.cursor_path())?;
        content
            .trim()
            .parse::<u64>()
            .map_err(|e| StorageError::InvalidData(format!("bad cursor: {}", e)))
    }

    fn write_cursor(&self, length: u64) -> Result<(), StorageError> {
        let temp_path = self.data_dir.join("length.tmp");
        fs::write(&temp_path, length.to_string())?;
        fs::rename(&temp_path, self.cursor_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChainParams, Ledger, Transaction};
    use crate::crypto::KeyPair;
    use chrono::Utc;

    fn test_params() -> ChainParams {
        ChainParams {
            initial_difficulty: 4,
            ..ChainParams::default()
        }
    }

    fn mine(mut block: Block) -> Block {
        loop {
            block.hash = block.compute_hash();
            if block.has_valid_pow() {
                return block;
            }
            block.nonce += 1;
        }
    }

    fn extend(ledger: &mut Ledger, address: &str) {
        let tip = ledger.latest_block();
        let reward = Transaction::reward(address, tip.index + 1);
        let block = mine(Block::new(
            tip.index + 1,
            tip.hash.clone(),
            Utc::now().timestamp(),
            ledger.next_difficulty(),
            vec![reward],
        ));
        ledger.add_block(block).unwrap();
    }

    #[test]
    fn test_empty_store_loads_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ChainStore::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ChainStore::new(temp_dir.path().to_path_buf()).unwrap();

        let kp = KeyPair::generate();
        let mut ledger = Ledger::new(test_params());
        extend(&mut ledger, &kp.address());
        extend(&mut ledger, &kp.address());

        store.save(ledger.blocks()).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded, ledger.blocks());

        // the loaded chain replays into an equivalent ledger
        let restored = Ledger::from_blocks(test_params(), loaded).unwrap();
        assert_eq!(restored.height(), ledger.height());
        assert_eq!(
            restored.balance(&kp.address()),
            ledger.balance(&kp.address())
        );
    }

    #[test]
    fn test_save_removes_stale_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ChainStore::new(temp_dir.path().to_path_buf()).unwrap();

        let kp = KeyPair::generate();
        let mut ledger = Ledger::new(test_params());
        extend(&mut ledger, &kp.address());
        extend(&mut ledger, &kp.address());
        store.save(ledger.blocks()).unwrap();

        store.save(&ledger.blocks()[..2]).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(!store.block_path(2).exists());
    }

    #[test]
    fn test_load_detects_misplaced_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ChainStore::new(temp_dir.path().to_path_buf()).unwrap();

        let genesis = Block::genesis();
        store.save(std::slice::from_ref(&genesis)).unwrap();

        // overwrite record 0 with a block claiming index 5
        let mut wrong = genesis;
        wrong.index = 5;
        let file = fs::File::create(store.block_path(0)).unwrap();
        serde_json::to_writer(BufWriter::new(file), &wrong).unwrap();

        assert!(matches!(
            store.load().unwrap_err(),
            StorageError::InvalidData(_)
        ));
    }
}
