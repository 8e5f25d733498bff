//! Peer-to-peer networking
//!
//! Gossip protocol over persistent TCP connections:
//! - `{type, data}` message envelopes
//! - peer registry with per-peer failure containment
//! - length-prefixed JSON framing
//! - fork-choice synchronization and pool gossip
//! - node wiring and the background mining loop

pub mod message;
pub mod node;
pub mod peer;
pub mod server;
pub mod sync;

pub use message::{Message, MAGIC, MAX_MESSAGE_SIZE};
pub use node::{Node, NodeConfig, NodeHandle};
pub use peer::{PeerError, PeerHandle, PeerManager, MAX_PEERS};
pub use server::{connect_to_peer, MessageCodec, Server};
pub use sync::GossipSync;
