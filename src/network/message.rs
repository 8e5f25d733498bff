//! Gossip message types
//!
//! The peer protocol exchanges `{type, data}` envelopes. Blocks and
//! transactions are serialized with every field including the redundant
//! `hash`/`id`; receivers re-verify them and never trust them.

use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = [0x4E, 0x41, 0x4E, 0x4F]; // "NANO"

/// Maximum accepted frame payload size in bytes
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Gossip protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Ask a peer for its latest block
    QueryLatest,

    /// Ask a peer for its full chain
    QueryAll,

    /// A chain fragment: the full chain, or a single latest block
    ResponseBlockchain(Vec<Block>),

    /// Ask a peer for its pending transactions
    QueryTransactionPool,

    /// A peer's pending transactions
    ResponseTransactionPool(Vec<Transaction>),
}

impl Message {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::QueryLatest => "QUERY_LATEST",
            Message::QueryAll => "QUERY_ALL",
            Message::ResponseBlockchain(_) => "RESPONSE_BLOCKCHAIN",
            Message::QueryTransactionPool => "QUERY_TRANSACTION_POOL",
            Message::ResponseTransactionPool(_) => "RESPONSE_TRANSACTION_POOL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(&Message::QueryLatest).unwrap();
        assert_eq!(json["type"], "QUERY_LATEST");

        let json = serde_json::to_value(&Message::ResponseBlockchain(vec![])).unwrap();
        assert_eq!(json["type"], "RESPONSE_BLOCKCHAIN");
        assert!(json["data"].is_array());
    }

    #[test]
    fn test_round_trip() {
        let msg = Message::ResponseBlockchain(vec![Block::genesis()]);
        let bytes = msg.to_bytes().unwrap();
        let decoded = Message::from_bytes(&bytes).unwrap();

        match decoded {
            Message::ResponseBlockchain(blocks) => {
                assert_eq!(blocks, vec![Block::genesis()]);
            }
            other => panic!("wrong message type: {}", other.type_name()),
        }
    }
}
