//! Blocks and the annotated form stored in the block tree.

use crate::encoding;
use crate::hash::{keccak256, Address, Hash};
use crate::vote::CommitCertificate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Maximum number of transactions a block may carry.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 1024;

/// Consensus metadata for a block.
///
/// The block hash is keccak-256 over the canonical encoding of exactly these
/// fields, in this order (see [`crate::encoding`]). The hash is computed
/// lazily and cached.
#[derive(Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain identifier, fixed for the lifetime of the chain.
    pub chain_id: String,
    /// Epoch in which this block was proposed.
    pub epoch: u64,
    /// Position in the chain; parent height + 1.
    pub height: u64,
    /// Hash of the parent block.
    pub parent: Hash,
    /// Root over the block's transaction payloads.
    pub tx_hash: Hash,
    /// State root after applying the parent chain.
    pub state_hash: Hash,
    /// Proposal wall-clock time, seconds.
    pub timestamp: u64,
    /// Address of the proposing validator.
    pub proposer: Address,

    /// Cache of the computed hash.
    #[serde(skip)]
    cached_hash: OnceLock<Hash>,
}

impl BlockHeader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: String,
        epoch: u64,
        height: u64,
        parent: Hash,
        tx_hash: Hash,
        state_hash: Hash,
        timestamp: u64,
        proposer: Address,
    ) -> Self {
        Self {
            chain_id,
            epoch,
            height,
            parent,
            tx_hash,
            state_hash,
            timestamp,
            proposer,
            cached_hash: OnceLock::new(),
        }
    }

    /// The block hash: keccak-256 of the canonical header encoding.
    pub fn hash(&self) -> Hash {
        *self
            .cached_hash
            .get_or_init(|| keccak256(&encoding::encode_header(self)))
    }
}

impl Clone for BlockHeader {
    fn clone(&self) -> Self {
        Self {
            chain_id: self.chain_id.clone(),
            epoch: self.epoch,
            height: self.height,
            parent: self.parent,
            tx_hash: self.tx_hash,
            state_hash: self.state_hash,
            timestamp: self.timestamp,
            proposer: self.proposer,
            // The cache is not carried over; it repopulates on first use.
            cached_hash: OnceLock::new(),
        }
    }
}

impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id
            && self.epoch == other.epoch
            && self.height == other.height
            && self.parent == other.parent
            && self.tx_hash == other.tx_hash
            && self.state_hash == other.state_hash
            && self.timestamp == other.timestamp
            && self.proposer == other.proposer
    }
}

impl Eq for BlockHeader {}

impl fmt::Debug for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockHeader")
            .field("hash", &self.hash())
            .field("epoch", &self.epoch)
            .field("height", &self.height)
            .field("parent", &self.parent)
            .field("proposer", &self.proposer)
            .finish()
    }
}

/// A block: header plus ordered opaque transaction payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Vec<u8>>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// The genesis block for a chain: height 0, epoch 0, zero roots.
    pub fn genesis(chain_id: &str) -> Self {
        let header = BlockHeader::new(
            chain_id.to_string(),
            0,
            0,
            Hash::ZERO,
            encoding::transactions_root(&[]),
            Hash::ZERO,
            0,
            Address::ZERO,
        );
        Self {
            header,
            transactions: Vec::new(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn epoch(&self) -> u64 {
        self.header.epoch
    }
}

/// Lifecycle status of a block in the tree.
///
/// Advances monotonically: Pending → Committed → Finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockStatus {
    /// Accepted into the tree, no commit certificate yet.
    Pending,
    /// Holds a commit certificate.
    Committed,
    /// Irrevocable under the two-chain rule.
    Finalized,
}

/// A block plus the tree bookkeeping attached to it.
///
/// Children and the parent are referenced by hash, never by pointer, so the
/// tree is an arena keyed by hash and serializes trivially.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedBlock {
    pub block: Block,
    /// Hashes of known children.
    pub children: Vec<Hash>,
    pub status: BlockStatus,
    /// Proof of quorum for this block, once one exists.
    pub commit_certificate: Option<CommitCertificate>,
}

impl ExtendedBlock {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            children: Vec::new(),
            status: BlockStatus::Pending,
            commit_certificate: None,
        }
    }

    pub fn hash(&self) -> Hash {
        self.block.hash()
    }

    pub fn height(&self) -> u64 {
        self.block.height()
    }

    pub fn epoch(&self) -> u64 {
        self.block.epoch()
    }

    pub fn parent_hash(&self) -> Hash {
        self.block.header.parent
    }

    pub fn has_commit_certificate(&self) -> bool {
        self.commit_certificate.is_some()
    }
}
