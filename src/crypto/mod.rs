//! Cryptographic primitives
//!
//! This module provides:
//! - SHA-256 hashing and the difficulty predicate
//! - ECDSA key management (secp256k1)

pub mod hash;
pub mod keys;

pub use hash::{hex_meets_difficulty, meets_difficulty, sha256, sha256_hex};
pub use keys::{
    is_valid_address, public_key_from_address, sign_message, verify_signature, KeyError, KeyPair,
    ADDRESS_HEX_LEN,
};
