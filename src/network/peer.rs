//! Peer management
//!
//! Tracks connected peers, deduplicated by address, and routes
//! messages to them. Send failures are logged and contained per peer;
//! one unreachable peer never aborts a broadcast to the others.

use crate::network::message::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

/// Maximum number of connected peers
pub const MAX_PEERS: usize = 16;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Max peers reached")]
    MaxPeersReached,
    #[error("Already connected to {0}")]
    AlreadyConnected(SocketAddr),
}

/// Handle for sending messages to one peer's writer task
#[derive(Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    pub tx: mpsc::Sender<Message>,
}

impl PeerHandle {
    pub async fn send(&self, msg: Message) -> Result<(), PeerError> {
        self.tx.send(msg).await.map_err(|_| PeerError::Disconnected)
    }
}

/// Registry of all connected peers
pub struct PeerManager {
    handles: RwLock<HashMap<SocketAddr, PeerHandle>>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Register a peer; rejects duplicates by address
    pub async fn add_peer(&self, handle: PeerHandle) -> Result<(), PeerError> {
        let mut handles = self.handles.write().await;

        if handles.len() >= MAX_PEERS {
            return Err(PeerError::MaxPeersReached);
        }
        if handles.contains_key(&handle.addr) {
            return Err(PeerError::AlreadyConnected(handle.addr));
        }

        log::info!("Peer connected: {}", handle.addr);
        handles.insert(handle.addr, handle);
        Ok(())
    }

    /// Drop a peer
    pub async fn remove_peer(&self, addr: &SocketAddr) {
        let mut handles = self.handles.write().await;
        if handles.remove(addr).is_some() {
            log::info!("Peer removed: {}", addr);
        }
    }

    /// Addresses of all connected peers
    pub async fn peer_addrs(&self) -> Vec<SocketAddr> {
        let handles = self.handles.read().await;
        handles.keys().cloned().collect()
    }

    /// Number of connected peers
    pub async fn peer_count(&self) -> usize {
        let handles = self.handles.read().await;
        handles.len()
    }

    /// Send a message to every peer; per-peer failures are logged and
    /// skipped
    pub async fn broadcast(&self, msg: Message) {
        let handles = self.handles.read().await;
        for (addr, handle) in handles.iter() {
            if let Err(e) = handle.send(msg.clone()).await {
                log::warn!("Failed to send {} to {}: {}", msg.type_name(), addr, e);
            }
        }
    }

    /// Send a message to every peer except one
    pub async fn broadcast_except(&self, msg: Message, except: &SocketAddr) {
        let handles = self.handles.read().await;
        for (addr, handle) in handles.iter() {
            if addr == except {
                continue;
            }
            if let Err(e) = handle.send(msg.clone()).await {
                log::warn!("Failed to send {} to {}: {}", msg.type_name(), addr, e);
            }
        }
    }

    /// Send a message to a specific peer
    pub async fn send_to(&self, addr: &SocketAddr, msg: Message) -> Result<(), PeerError> {
        let handles = self.handles.read().await;
        match handles.get(addr) {
            Some(handle) => handle.send(msg).await,
            None => Err(PeerError::Disconnected),
        }
    }
}

impl Default for PeerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(port: u16) -> (PeerHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        (PeerHandle { addr, tx }, rx)
    }

    #[tokio::test]
    async fn test_add_peer_dedups_by_address() {
        let manager = PeerManager::new();
        let (h1, _rx1) = handle(7001);
        let (h2, _rx2) = handle(7001);

        manager.add_peer(h1).await.unwrap();
        let err = manager.add_peer(h2).await.unwrap_err();
        assert!(matches!(err, PeerError::AlreadyConnected(_)));
        assert_eq!(manager.peer_count().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_peer() {
        let manager = PeerManager::new();
        let (h1, rx1) = handle(7001);
        let (h2, mut rx2) = handle(7002);

        manager.add_peer(h1).await.unwrap();
        manager.add_peer(h2).await.unwrap();

        // first peer's reader is gone
        drop(rx1);

        manager.broadcast(Message::QueryLatest).await;
        assert!(matches!(rx2.recv().await, Some(Message::QueryLatest)));
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_origin() {
        let manager = PeerManager::new();
        let (h1, mut rx1) = handle(7001);
        let (h2, mut rx2) = handle(7002);
        let origin = h1.addr;

        manager.add_peer(h1).await.unwrap();
        manager.add_peer(h2).await.unwrap();

        manager.broadcast_except(Message::QueryAll, &origin).await;
        assert!(matches!(rx2.recv().await, Some(Message::QueryAll)));
        assert!(rx1.try_recv().is_err());
    }
}
