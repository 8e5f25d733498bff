//! P2P node
//!
//! Wires the transport, the gossip state machine and the miner
//! together. One task per peer connection reads inbound messages into a
//! single dispatch loop; the proof-of-work search runs on its own
//! worker and is cancelled and restarted whenever the tip moves.

use crate::core::Ledger;
use crate::mining::{Miner, MiningTask, TransactionPool};
use crate::network::message::Message;
use crate::network::peer::{PeerError, PeerManager};
use crate::network::server::{connect_to_peer, handle_connection, Server};
use crate::network::sync::GossipSync;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port to listen on for peer connections
    pub p2p_port: u16,
    /// Peers to connect to at startup
    pub bootstrap_peers: Vec<String>,
    /// Mine continuously to this address when set
    pub reward_address: Option<String>,
    /// Fee recipient; defaults to the reward address
    pub fee_address: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            p2p_port: 6001,
            bootstrap_peers: Vec::new(),
            reward_address: None,
            fee_address: None,
        }
    }
}

/// Cheap cloneable handle for connecting peers from outside the node
/// (the HTTP boundary uses this)
#[derive(Clone)]
pub struct NodeHandle {
    peers: Arc<PeerManager>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
}

impl NodeHandle {
    /// Open an outbound connection to a peer
    pub async fn connect(&self, addr: &str) -> Result<(), PeerError> {
        log::info!("Connecting to peer: {}", addr);

        let (stream, peer_addr) = connect_to_peer(addr).await?;

        let pm = self.peers.clone();
        let message_tx = self.message_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, pm, message_tx).await {
                log::warn!("Connection error with {}: {}", peer_addr, e);
            }
        });

        Ok(())
    }

    /// Addresses of all connected peers
    pub async fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.peers.peer_addrs().await
    }
}

/// The main P2P node
pub struct Node {
    pub config: NodeConfig,
    pub ledger: Arc<RwLock<Ledger>>,
    pub pool: Arc<RwLock<TransactionPool>>,
    pub peers: Arc<PeerManager>,
    pub sync: Arc<GossipSync>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
    message_rx: Option<mpsc::Receiver<(SocketAddr, Message)>>,
}

impl Node {
    /// Create a node over shared ledger and pool handles. The handles
    /// are constructed once at process start and passed in explicitly;
    /// the HTTP layer shares the same instances.
    pub fn new(
        config: NodeConfig,
        ledger: Arc<RwLock<Ledger>>,
        pool: Arc<RwLock<TransactionPool>>,
    ) -> Self {
        let peers = Arc::new(PeerManager::new());
        let sync = Arc::new(GossipSync::new(ledger.clone(), pool.clone(), peers.clone()));
        let (message_tx, message_rx) = mpsc::channel::<(SocketAddr, Message)>(1000);

        Self {
            config,
            ledger,
            pool,
            peers,
            sync,
            message_tx,
            message_rx: Some(message_rx),
        }
    }

    /// Handle for connecting peers from other components
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            peers: self.peers.clone(),
            message_tx: self.message_tx.clone(),
        }
    }

    /// Run the node: accept connections, dispatch messages, and mine if
    /// configured. Does not return under normal operation.
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let server = Server::bind(self.config.p2p_port).await?;

        let mut message_rx = self
            .message_rx
            .take()
            .ok_or("node already started")?;

        // connection acceptor
        let accept_peers = self.peers.clone();
        let accept_tx = self.message_tx.clone();
        tokio::spawn(async move {
            loop {
                match server.accept().await {
                    Ok((stream, addr)) => {
                        log::info!("Incoming connection from {}", addr);
                        let pm = accept_peers.clone();
                        let tx = accept_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, pm, tx).await {
                                log::warn!("Connection error with {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("Accept error: {}", e);
                    }
                }
            }
        });

        for peer_addr in self.config.bootstrap_peers.clone() {
            if let Err(e) = self.connect_to(&peer_addr).await {
                log::warn!("Failed to connect to bootstrap peer {}: {}", peer_addr, e);
            }
        }

        if let Some(reward_address) = self.config.reward_address.clone() {
            let fee_address = self
                .config
                .fee_address
                .clone()
                .unwrap_or_else(|| reward_address.clone());
            self.spawn_mining_loop(Miner::new(&reward_address, &fee_address));
        }

        while let Some((from, msg)) = message_rx.recv().await {
            self.handle_message(from, msg).await;
        }

        Ok(())
    }

    /// Open an outbound connection to a peer
    pub async fn connect_to(&self, addr: &str) -> Result<(), PeerError> {
        self.handle().connect(addr).await
    }

    /// Dispatch one inbound gossip message
    async fn handle_message(&self, from: SocketAddr, msg: Message) {
        log::debug!("Received {} from {}", msg.type_name(), from);

        match msg {
            Message::QueryLatest => {
                let response = self.sync.latest_message().await;
                if let Err(e) = self.peers.send_to(&from, response).await {
                    log::warn!("Failed to send latest block to {}: {}", from, e);
                }
            }

            Message::QueryAll => {
                let response = self.sync.chain_message().await;
                if let Err(e) = self.peers.send_to(&from, response).await {
                    log::warn!("Failed to send chain to {}: {}", from, e);
                }
            }

            Message::ResponseBlockchain(blocks) => {
                self.sync.handle_blockchain_response(blocks, from).await;
            }

            Message::QueryTransactionPool => {
                let response = self.sync.pool_message().await;
                if let Err(e) = self.peers.send_to(&from, response).await {
                    log::warn!("Failed to send pool to {}: {}", from, e);
                }
            }

            Message::ResponseTransactionPool(transactions) => {
                self.sync.handle_pool_response(transactions, from).await;
            }
        }
    }

    /// Mine continuously: assemble a candidate from the pool, search
    /// for a nonce on a blocking worker, and submit the result. The
    /// search is cancelled and restarted whenever the tip changes.
    fn spawn_mining_loop(&self, miner: Miner) {
        let ledger = self.ledger.clone();
        let pool = self.pool.clone();
        let sync = self.sync.clone();
        let mut tip_rx = self.sync.tip_watch();

        tokio::spawn(async move {
            log::info!("Mining to {}", miner.reward_address);
            loop {
                tip_rx.borrow_and_update();

                let candidate = {
                    let ledger = ledger.read().await;
                    let pool = pool.read().await;
                    miner.assemble_candidate(&ledger, &pool.snapshot(), Utc::now().timestamp())
                };

                let task = MiningTask::spawn(candidate);
                let token = task.token();
                let join = task.join();
                tokio::pin!(join);

                tokio::select! {
                    changed = tip_rx.changed() => {
                        // a competing block arrived first; abandon and
                        // restart on the new tip
                        token.cancel();
                        let _ = (&mut join).await;
                        if changed.is_err() {
                            break;
                        }
                    }
                    mined = &mut join => {
                        if let Some(block) = mined {
                            if let Err(e) = sync.submit_block(block).await {
                                log::warn!("Locally mined block rejected: {}", e);
                            }
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Block, ChainParams};
    use crate::network::peer::PeerHandle;

    fn test_node() -> Node {
        let ledger = Arc::new(RwLock::new(Ledger::new(ChainParams {
            initial_difficulty: 4,
            ..ChainParams::default()
        })));
        let pool = Arc::new(RwLock::new(TransactionPool::new()));
        Node::new(NodeConfig::default(), ledger, pool)
    }

    #[tokio::test]
    async fn test_new_node_state() {
        let node = test_node();
        assert_eq!(node.ledger.read().await.height(), 0);
        assert!(node.pool.read().await.is_empty());
        assert_eq!(node.peers.peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_query_latest_answers_with_tail() {
        let node = test_node();

        let (tx, mut rx) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:9401".parse().unwrap();
        node.peers.add_peer(PeerHandle { addr, tx }).await.unwrap();

        node.handle_message(addr, Message::QueryLatest).await;

        match rx.recv().await.unwrap() {
            Message::ResponseBlockchain(blocks) => {
                assert_eq!(blocks, vec![Block::genesis()]);
            }
            other => panic!("unexpected response: {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_query_pool_answers_with_snapshot() {
        let node = test_node();

        let (tx, mut rx) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:9402".parse().unwrap();
        node.peers.add_peer(PeerHandle { addr, tx }).await.unwrap();

        node.handle_message(addr, Message::QueryTransactionPool).await;

        match rx.recv().await.unwrap() {
            Message::ResponseTransactionPool(transactions) => {
                assert!(transactions.is_empty());
            }
            other => panic!("unexpected response: {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_peer_fails() {
        let node = test_node();
        let err = node.connect_to("127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, PeerError::ConnectionFailed(_)));
    }
}
