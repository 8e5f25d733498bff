//! Gossip synchronization
//!
//! The fork-choice state machine reconciling the local ledger with
//! chains and transactions gossiped by peers, plus the local submission
//! paths that feed the same machinery. Every ledger mutation flows
//! through here so the pool is pruned and the new tip is announced
//! exactly once per change.

use crate::core::{Block, Ledger, LedgerError, Transaction};
use crate::mining::{PoolError, TransactionPool};
use crate::network::message::Message;
use crate::network::peer::PeerManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Reconciles peer gossip with the local ledger and pool
pub struct GossipSync {
    ledger: Arc<RwLock<Ledger>>,
    pool: Arc<RwLock<TransactionPool>>,
    peers: Arc<PeerManager>,
    tip_tx: watch::Sender<String>,
}

impl GossipSync {
    pub fn new(
        ledger: Arc<RwLock<Ledger>>,
        pool: Arc<RwLock<TransactionPool>>,
        peers: Arc<PeerManager>,
    ) -> Self {
        let (tip_tx, _) = watch::channel(String::new());
        Self {
            ledger,
            pool,
            peers,
            tip_tx,
        }
    }

    /// Subscribe to tip changes; the miner uses this to cancel and
    /// restart an in-flight search when the tip moves
    pub fn tip_watch(&self) -> watch::Receiver<String> {
        self.tip_tx.subscribe()
    }

    /// Handle a `RESPONSE_BLOCKCHAIN` from a peer.
    ///
    /// If the candidate tail is not ahead of ours, ignore. If it
    /// extends our tip directly, append it (cheap path). If a single
    /// gossiped block does not attach, the sender may simply be further
    /// ahead, so query its full chain rather than rejecting. A longer
    /// fragment is attempted as a full chain replacement; failures are
    /// dropped with a log line, keeping the local chain.
    pub async fn handle_blockchain_response(&self, received: Vec<Block>, from: SocketAddr) {
        let Some(latest_received) = received.last().cloned() else {
            log::warn!("Received empty blockchain response from {}", from);
            return;
        };

        let mut ledger = self.ledger.write().await;
        let latest_held = ledger.latest_block().clone();

        if latest_received.index <= latest_held.index {
            log::debug!(
                "Received chain tail {} not ahead of ours {}, ignoring",
                latest_received.index,
                latest_held.index
            );
            return;
        }

        if latest_received.previous_hash == latest_held.hash {
            match ledger.add_block(latest_received) {
                Ok(()) => {
                    self.after_ledger_change(&ledger).await;
                    drop(ledger);
                    self.broadcast_latest().await;
                }
                Err(e) => log::warn!("Rejected gossiped block from {}: {}", from, e),
            }
        } else if received.len() == 1 {
            drop(ledger);
            log::info!("Peer {} is ahead on an unknown chain, querying it fully", from);
            if let Err(e) = self.peers.send_to(&from, Message::QueryAll).await {
                log::warn!("Failed to query chain from {}: {}", from, e);
            }
        } else {
            match ledger.replace_chain(received) {
                Ok(()) => {
                    self.after_ledger_change(&ledger).await;
                    drop(ledger);
                    self.broadcast_latest().await;
                }
                Err(e) => log::debug!("Rejected candidate chain from {}: {}", from, e),
            }
        }
    }

    /// Handle a `RESPONSE_TRANSACTION_POOL` from a peer. Each
    /// transaction is admitted independently; one rejection never
    /// blocks the others.
    pub async fn handle_pool_response(&self, transactions: Vec<Transaction>, from: SocketAddr) {
        let mut admitted = 0usize;

        for tx in transactions {
            let ledger = self.ledger.read().await;
            let mut pool = self.pool.write().await;
            match pool.add(tx, ledger.utxo_set()) {
                Ok(()) => admitted += 1,
                Err(e) => log::debug!("Rejected pooled transaction from {}: {}", from, e),
            }
        }

        if admitted > 0 {
            self.broadcast_pool().await;
        }
    }

    /// Submit a locally produced block (mined here or via the API)
    pub async fn submit_block(&self, block: Block) -> Result<(), LedgerError> {
        let mut ledger = self.ledger.write().await;
        ledger.add_block(block)?;
        self.after_ledger_change(&ledger).await;
        drop(ledger);
        self.broadcast_latest().await;
        Ok(())
    }

    /// Submit a locally created transaction and gossip it on success
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<(), PoolError> {
        {
            let ledger = self.ledger.read().await;
            let mut pool = self.pool.write().await;
            pool.add(tx, ledger.utxo_set())?;
        }
        self.broadcast_pool().await;
        Ok(())
    }

    /// `RESPONSE_BLOCKCHAIN` carrying only the tail block
    pub async fn latest_message(&self) -> Message {
        let ledger = self.ledger.read().await;
        Message::ResponseBlockchain(vec![ledger.latest_block().clone()])
    }

    /// `RESPONSE_BLOCKCHAIN` carrying the whole chain
    pub async fn chain_message(&self) -> Message {
        let ledger = self.ledger.read().await;
        Message::ResponseBlockchain(ledger.blocks().to_vec())
    }

    /// `RESPONSE_TRANSACTION_POOL` carrying the current pool
    pub async fn pool_message(&self) -> Message {
        let pool = self.pool.read().await;
        Message::ResponseTransactionPool(pool.snapshot())
    }

    /// Announce the current tail block to all peers
    pub async fn broadcast_latest(&self) {
        let msg = self.latest_message().await;
        self.peers.broadcast(msg).await;
    }

    /// Gossip the current pool to all peers
    pub async fn broadcast_pool(&self) {
        let msg = self.pool_message().await;
        self.peers.broadcast(msg).await;
    }

    /// Prune the pool against the new UTXO set and announce the new
    /// tip. Called with the ledger write lock held so no competing
    /// mutation can interleave.
    async fn after_ledger_change(&self, ledger: &Ledger) {
        let mut pool = self.pool.write().await;
        pool.prune(ledger.utxo_set());
        let _ = self.tip_tx.send(ledger.latest_block().hash.clone());
    }
}
