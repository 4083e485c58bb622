//! The block tree.
//!
//! An arena of all known blocks from a fixed root, keyed by hash. Parent and
//! child references are hashes, never owning pointers, so the structure is
//! acyclic by construction and serializes trivially.

use std::collections::HashMap;
use tessera_types::{
    transactions_root, Block, BlockStatus, CommitCertificate, ExtendedBlock, Hash,
    MAX_TRANSACTIONS_PER_BLOCK,
};
use thiserror::Error;
use tracing::debug;

/// Errors from block insertion and lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockTreeError {
    #[error("parent {0} is not in the tree")]
    OrphanParent(Hash),

    #[error("block {0} is already in the tree")]
    Duplicate(Hash),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("block {0} not found")]
    NotFound(Hash),
}

/// In-memory tree of blocks rooted at genesis (or the last restored
/// checkpoint).
#[derive(Debug, Clone)]
pub struct BlockTree {
    blocks: HashMap<Hash, ExtendedBlock>,
    root: Hash,
}

impl BlockTree {
    /// Create a tree holding only `root`, which starts out Finalized.
    pub fn new(root: Block) -> Self {
        let root_hash = root.hash();
        let mut extended = ExtendedBlock::new(root);
        extended.status = BlockStatus::Finalized;

        let mut blocks = HashMap::new();
        blocks.insert(root_hash, extended);
        Self {
            blocks,
            root: root_hash,
        }
    }

    pub fn root_hash(&self) -> Hash {
        self.root
    }

    pub fn root(&self) -> &ExtendedBlock {
        &self.blocks[&self.root]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Find a block by hash.
    pub fn find(&self, hash: &Hash) -> Option<&ExtendedBlock> {
        self.blocks.get(hash)
    }

    /// Insert a block whose parent is already known, linking the child
    /// pointer on the parent.
    pub fn insert(&mut self, block: Block) -> Result<&ExtendedBlock, BlockTreeError> {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return Err(BlockTreeError::Duplicate(hash));
        }

        let parent_hash = block.header.parent;
        let parent = self
            .blocks
            .get(&parent_hash)
            .ok_or(BlockTreeError::OrphanParent(parent_hash))?;

        self.validate_header(&block, parent)?;

        if let Some(parent) = self.blocks.get_mut(&parent_hash) {
            parent.children.push(hash);
        }
        self.blocks.insert(hash, ExtendedBlock::new(block));

        debug!(block = ?hash, parent = ?parent_hash, "Inserted block");
        Ok(&self.blocks[&hash])
    }

    /// Header well-formedness relative to the parent.
    fn validate_header(&self, block: &Block, parent: &ExtendedBlock) -> Result<(), BlockTreeError> {
        let header = &block.header;
        let root_chain = &self.root().block.header.chain_id;

        if header.chain_id != *root_chain {
            return Err(BlockTreeError::InvalidHeader(format!(
                "chain id {:?} does not match {:?}",
                header.chain_id, root_chain
            )));
        }
        if header.height != parent.height() + 1 {
            return Err(BlockTreeError::InvalidHeader(format!(
                "height {} is not parent height {} + 1",
                header.height,
                parent.height()
            )));
        }
        if header.epoch < parent.epoch() {
            return Err(BlockTreeError::InvalidHeader(format!(
                "epoch {} is below parent epoch {}",
                header.epoch,
                parent.epoch()
            )));
        }
        if header.timestamp < parent.block.header.timestamp {
            return Err(BlockTreeError::InvalidHeader(format!(
                "timestamp {} is below parent timestamp {}",
                header.timestamp, parent.block.header.timestamp
            )));
        }
        if block.transactions.len() > MAX_TRANSACTIONS_PER_BLOCK {
            return Err(BlockTreeError::InvalidHeader(format!(
                "{} transactions exceeds the cap of {}",
                block.transactions.len(),
                MAX_TRANSACTIONS_PER_BLOCK
            )));
        }
        if header.tx_hash != transactions_root(&block.transactions) {
            return Err(BlockTreeError::InvalidHeader(
                "tx root does not match transactions".to_string(),
            ));
        }
        Ok(())
    }

    /// The fork-choice rule: the tip of the longest path starting at `from`,
    /// ties broken by (highest epoch, then lexicographic block hash).
    pub fn find_deepest_descendant(&self, from: &Hash) -> Option<&ExtendedBlock> {
        let start = self.blocks.get(from)?;

        let mut best = start;
        let mut stack: Vec<&Hash> = start.children.iter().collect();
        while let Some(hash) = stack.pop() {
            let block = match self.blocks.get(hash) {
                Some(b) => b,
                None => continue,
            };
            let better = (block.height(), block.epoch(), block.hash())
                > (best.height(), best.epoch(), best.hash());
            if better {
                best = block;
            }
            stack.extend(block.children.iter());
        }
        Some(best)
    }

    /// True iff `a` lies on the parent chain of `b` (inclusive).
    pub fn is_ancestor(&self, a: &Hash, b: &Hash) -> bool {
        if !self.blocks.contains_key(a) {
            return false;
        }
        let mut current = *b;
        loop {
            if current == *a {
                return true;
            }
            match self.blocks.get(&current) {
                Some(block) if current != self.root => current = block.parent_hash(),
                _ => return false,
            }
        }
    }

    /// Attach a commit certificate to a block, promoting it to Committed.
    ///
    /// Idempotent: returns true only when the certificate was newly attached.
    pub fn attach_certificate(&mut self, hash: &Hash, certificate: CommitCertificate) -> bool {
        match self.blocks.get_mut(hash) {
            Some(block) if block.commit_certificate.is_none() => {
                block.commit_certificate = Some(certificate);
                if block.status < BlockStatus::Committed {
                    block.status = BlockStatus::Committed;
                }
                true
            }
            _ => false,
        }
    }

    /// Promote a block to Finalized.
    pub fn mark_finalized(&mut self, hash: &Hash) -> Result<(), BlockTreeError> {
        let block = self
            .blocks
            .get_mut(hash)
            .ok_or(BlockTreeError::NotFound(*hash))?;
        block.status = BlockStatus::Finalized;
        Ok(())
    }

    /// Checkpoint pruning: drop every block that is not `checkpoint` or one
    /// of its descendants, and re-root the tree at `checkpoint`.
    ///
    /// The caller guarantees `checkpoint` is finalized; everything the
    /// current fork-choice tip references transitively descends from it, so
    /// reachable commit certificates survive.
    pub fn prune_below(&mut self, checkpoint: &Hash) -> Result<usize, BlockTreeError> {
        if !self.blocks.contains_key(checkpoint) {
            return Err(BlockTreeError::NotFound(*checkpoint));
        }

        let mut keep = std::collections::HashSet::new();
        let mut stack = vec![*checkpoint];
        while let Some(hash) = stack.pop() {
            if keep.insert(hash) {
                if let Some(block) = self.blocks.get(&hash) {
                    stack.extend(block.children.iter().copied());
                }
            }
        }

        let before = self.blocks.len();
        self.blocks.retain(|hash, _| keep.contains(hash));
        self.root = *checkpoint;
        Ok(before - self.blocks.len())
    }

    /// Iterate all blocks (order unspecified).
    pub fn iter(&self) -> impl Iterator<Item = &ExtendedBlock> {
        self.blocks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{Address, BlockHeader};

    fn child_of(parent: &Block, epoch: u64, seed: u8) -> Block {
        let header = BlockHeader::new(
            parent.header.chain_id.clone(),
            epoch,
            parent.height() + 1,
            parent.hash(),
            transactions_root(&[]),
            Hash::ZERO,
            parent.header.timestamp + 1,
            Address::new([seed; 20]),
        );
        Block::new(header, vec![])
    }

    #[test]
    fn test_insert_and_find() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());

        let b1 = child_of(&genesis, 1, 1);
        tree.insert(b1.clone()).unwrap();

        let found = tree.find(&b1.hash()).unwrap();
        assert_eq!(found.height(), 1);
        assert_eq!(found.status, BlockStatus::Pending);
        assert_eq!(tree.root().children, vec![b1.hash()]);
    }

    #[test]
    fn test_insert_duplicate() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());
        let b1 = child_of(&genesis, 1, 1);

        tree.insert(b1.clone()).unwrap();
        assert_eq!(
            tree.insert(b1.clone()),
            Err(BlockTreeError::Duplicate(b1.hash()))
        );
    }

    #[test]
    fn test_insert_orphan() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());
        let b1 = child_of(&genesis, 1, 1);
        let b2 = child_of(&b1, 2, 2);

        assert_eq!(
            tree.insert(b2),
            Err(BlockTreeError::OrphanParent(b1.hash()))
        );
    }

    #[test]
    fn test_rejects_bad_height_and_epoch() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());
        let b1 = child_of(&genesis, 3, 1);
        tree.insert(b1.clone()).unwrap();

        // Height must be parent + 1.
        let mut skipped = child_of(&b1, 4, 2);
        skipped.header.height = 5;
        let skipped = Block::new(skipped.header.clone(), vec![]);
        assert!(matches!(
            tree.insert(skipped),
            Err(BlockTreeError::InvalidHeader(_))
        ));

        // Epoch may not go backwards.
        let regressed = child_of(&b1, 2, 3);
        assert!(matches!(
            tree.insert(regressed),
            Err(BlockTreeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_deepest_descendant_prefers_longer_branch() {
        // Genesis → a1 → a2
        //         ↘ b1 → b2 → b3
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());

        let a1 = child_of(&genesis, 1, 1);
        let a2 = child_of(&a1, 2, 2);
        let b1 = child_of(&genesis, 1, 3);
        let b2 = child_of(&b1, 2, 4);
        let b3 = child_of(&b2, 3, 5);
        for block in [&a1, &a2, &b1, &b2, &b3] {
            tree.insert(block.clone()).unwrap();
        }

        let tip = tree.find_deepest_descendant(&genesis.hash()).unwrap();
        assert_eq!(tip.hash(), b3.hash());
        // The tip's parent lies on the longer branch.
        assert_eq!(tip.parent_hash(), b2.hash());
    }

    #[test]
    fn test_deepest_descendant_tie_break_by_epoch() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());

        let a = child_of(&genesis, 1, 1);
        let b = child_of(&genesis, 4, 2);
        tree.insert(a).unwrap();
        tree.insert(b.clone()).unwrap();

        let tip = tree.find_deepest_descendant(&genesis.hash()).unwrap();
        assert_eq!(tip.hash(), b.hash());
    }

    #[test]
    fn test_deepest_descendant_tie_break_by_hash() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());

        let a = child_of(&genesis, 1, 1);
        let b = child_of(&genesis, 1, 2);
        tree.insert(a.clone()).unwrap();
        tree.insert(b.clone()).unwrap();

        let expected = if a.hash() > b.hash() { a } else { b };
        let tip = tree.find_deepest_descendant(&genesis.hash()).unwrap();
        assert_eq!(tip.hash(), expected.hash());
    }

    #[test]
    fn test_is_ancestor() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());

        let a1 = child_of(&genesis, 1, 1);
        let a2 = child_of(&a1, 2, 2);
        let b1 = child_of(&genesis, 1, 3);
        for block in [&a1, &a2, &b1] {
            tree.insert(block.clone()).unwrap();
        }

        assert!(tree.is_ancestor(&genesis.hash(), &a2.hash()));
        assert!(tree.is_ancestor(&a1.hash(), &a2.hash()));
        assert!(tree.is_ancestor(&a2.hash(), &a2.hash()));
        assert!(!tree.is_ancestor(&a2.hash(), &a1.hash()));
        assert!(!tree.is_ancestor(&b1.hash(), &a2.hash()));
    }

    #[test]
    fn test_prune_below_keeps_descendants() {
        let genesis = Block::genesis("test");
        let mut tree = BlockTree::new(genesis.clone());

        let a1 = child_of(&genesis, 1, 1);
        let a2 = child_of(&a1, 2, 2);
        let b1 = child_of(&genesis, 1, 3);
        for block in [&a1, &a2, &b1] {
            tree.insert(block.clone()).unwrap();
        }

        let dropped = tree.prune_below(&a1.hash()).unwrap();
        assert_eq!(dropped, 2); // genesis and b1
        assert_eq!(tree.root_hash(), a1.hash());
        assert!(tree.contains(&a2.hash()));
        assert!(!tree.contains(&b1.hash()));
    }
}
