//! Signed block proposals.

use crate::block::Block;
use crate::crypto::{proposal_message, CryptoError, KeyPair, PublicKey, Signature};
use crate::vote::CommitCertificate;
use serde::{Deserialize, Serialize};

/// A leader's proposal: a block, optionally accompanied by the commit
/// certificate proving quorum for the block's parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub block: Block,
    /// Certificate for `block.header.parent`, carried so replicas that have
    /// not yet seen the quorum can attach it.
    pub parent_certificate: Option<CommitCertificate>,
    /// Proposer's signature over the block hash.
    pub signature: Signature,
}

impl Proposal {
    /// Build and sign a proposal.
    pub fn new(block: Block, parent_certificate: Option<CommitCertificate>, key: &KeyPair) -> Self {
        let message = proposal_message(&block.header.chain_id, &block.hash());
        let signature = key.sign(&message);
        Self {
            block,
            parent_certificate,
            signature,
        }
    }

    /// Verify the proposer's signature with `public_key`.
    pub fn verify_signature(&self, public_key: &PublicKey) -> Result<(), CryptoError> {
        let message = proposal_message(&self.block.header.chain_id, &self.block.hash());
        public_key.verify(&message, &self.signature)
    }

    pub fn epoch(&self) -> u64 {
        self.block.epoch()
    }

    pub fn height(&self) -> u64 {
        self.block.height()
    }
}
