//! SHA-256 hashing utilities
//!
//! Used for block hashes, transaction ids and the proof-of-work
//! difficulty check.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes the SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Checks if a hash meets the difficulty target
/// The hash must have `difficulty` leading zero bits
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let full_bytes = difficulty as usize / 8;
    let remaining_bits = difficulty as usize % 8;

    if hash.len() < full_bytes + usize::from(remaining_bits > 0) {
        return false;
    }

    for byte in hash.iter().take(full_bytes) {
        if *byte != 0 {
            return false;
        }
    }

    if remaining_bits > 0 {
        let mask = 0xFF << (8 - remaining_bits);
        if hash[full_bytes] & mask != 0 {
            return false;
        }
    }

    true
}

/// Checks a hex-encoded hash against the difficulty target
pub fn hex_meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    match hex::decode(hash_hex) {
        Ok(bytes) => meets_difficulty(&bytes, difficulty),
        Err(_) => false,
    }
}
