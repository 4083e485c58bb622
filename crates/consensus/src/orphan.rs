//! Bounded buffer for proposals whose parent is not yet known.

use std::collections::{HashMap, VecDeque};
use tessera_types::{Hash, Proposal};
use tracing::debug;

/// Proposals waiting for a parent, keyed by the missing parent's hash.
///
/// Capacity-bounded; when full, the least recently buffered proposal is
/// evicted. A proposal that outlives the buffer is simply dropped - the
/// network will re-deliver it or the chain moves on without it.
#[derive(Debug)]
pub struct OrphanPool {
    capacity: usize,
    by_parent: HashMap<Hash, Vec<Proposal>>,
    /// Eviction order: (parent hash, block hash), oldest first.
    order: VecDeque<(Hash, Hash)>,
}

impl OrphanPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            by_parent: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Buffer a proposal under its missing parent.
    pub fn insert(&mut self, proposal: Proposal) {
        let block_hash = proposal.block.hash();
        let parent = proposal.block.header.parent;

        let siblings = self.by_parent.entry(parent).or_default();
        if siblings.iter().any(|p| p.block.hash() == block_hash) {
            return;
        }
        siblings.push(proposal);
        self.order.push_back((parent, block_hash));

        while self.order.len() > self.capacity {
            if let Some((evicted_parent, evicted_hash)) = self.order.pop_front() {
                if let Some(list) = self.by_parent.get_mut(&evicted_parent) {
                    list.retain(|p| p.block.hash() != evicted_hash);
                    if list.is_empty() {
                        self.by_parent.remove(&evicted_parent);
                    }
                }
                debug!(block = ?evicted_hash, "Evicted orphan proposal");
            }
        }
    }

    /// Remove and return every buffered proposal waiting on `parent`.
    pub fn take_children(&mut self, parent: &Hash) -> Vec<Proposal> {
        let children = self.by_parent.remove(parent).unwrap_or_default();
        if !children.is_empty() {
            self.order.retain(|(p, _)| p != parent);
        }
        children
    }
}
