//! Mempool state.

use std::collections::{HashMap, VecDeque};
use tessera_core::{Action, ChannelId, OutboundMessage};
use tessera_types::{keccak256, Block, Hash};
use tracing::{debug, trace, warn};

/// Mempool tunables.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum transactions held; submissions beyond this are refused.
    pub capacity: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Mempool state machine.
///
/// Uses `HashMap` rather than a concurrent map since all access is
/// serialized through the node's event loop.
#[derive(Debug)]
pub struct MempoolState {
    config: MempoolConfig,
    pool: HashMap<Hash, Vec<u8>>,
    /// Insertion order; `reap` returns transactions oldest first.
    order: VecDeque<Hash>,
}

impl MempoolState {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            pool: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.pool.contains_key(hash)
    }

    /// Handle a transaction submitted by a client. Gossips it to peers.
    pub fn on_transaction_submitted(&mut self, raw: Vec<u8>) -> Vec<Action> {
        let hash = keccak256(&raw);
        if !self.admit(hash, raw.clone()) {
            return Vec::new();
        }
        debug!(tx = ?hash, pool_size = self.pool.len(), "Transaction submitted");

        vec![Action::Broadcast {
            channel: ChannelId::Transaction,
            message: OutboundMessage::Transaction(raw),
        }]
    }

    /// Handle a transaction received via gossip. Not re-broadcast.
    pub fn on_transaction_received(&mut self, raw: Vec<u8>) -> Vec<Action> {
        let hash = keccak256(&raw);
        if self.admit(hash, raw) {
            trace!(tx = ?hash, pool_size = self.pool.len(), "Transaction gossiped in");
        }
        Vec::new()
    }

    fn admit(&mut self, hash: Hash, raw: Vec<u8>) -> bool {
        if self.pool.contains_key(&hash) {
            trace!(tx = ?hash, "Duplicate transaction ignored");
            return false;
        }
        if self.pool.len() >= self.config.capacity {
            warn!(tx = ?hash, capacity = self.config.capacity, "Mempool full, refusing transaction");
            return false;
        }
        self.pool.insert(hash, raw);
        self.order.push_back(hash);
        true
    }

    /// Copy out up to `max_count` transactions, oldest first.
    ///
    /// Non-destructive: the engine copies payloads into the proposal and the
    /// pool drops them only once a finalized block carries them.
    pub fn reap(&self, max_count: usize) -> Vec<Vec<u8>> {
        self.order
            .iter()
            .filter_map(|hash| self.pool.get(hash))
            .take(max_count)
            .cloned()
            .collect()
    }

    /// A block was finalized: evict everything it carried.
    pub fn on_block_finalized(&mut self, block: &Block) {
        if block.transactions.is_empty() {
            return;
        }
        let mut evicted = 0usize;
        for raw in &block.transactions {
            let hash = keccak256(raw);
            if self.pool.remove(&hash).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            let pool = &self.pool;
            self.order.retain(|hash| pool.contains_key(hash));
            debug!(
                evicted,
                height = block.height(),
                pool_size = self.pool.len(),
                "Evicted finalized transactions"
            );
        }
    }
}
