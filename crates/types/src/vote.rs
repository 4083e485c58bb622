//! Votes, vote sets, and commit certificates.

use crate::crypto::{vote_message, CryptoError, KeyPair, Signature};
use crate::hash::{Address, Hash};
use crate::validator::ValidatorSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from commit-certificate validation.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("vote references block {vote} but certificate is for {certificate}")]
    WrongBlock { vote: Hash, certificate: Hash },

    #[error("voter {0} is not in the validator set")]
    UnknownVoter(Address),

    #[error("invalid signature from voter {0}")]
    BadSignature(Address),

    #[error("voter stake {stake} does not exceed two thirds of total {total}")]
    NoQuorum { stake: u64, total: u64 },
}

/// A signed vote for one block at one epoch.
///
/// Votes are uniquely identified by (voter, block hash); the signature covers
/// the domain-tagged (block hash, epoch) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: Address,
    pub block_hash: Hash,
    pub epoch: u64,
    pub signature: Signature,
}

impl Vote {
    /// Create and sign a vote.
    pub fn new(chain_id: &str, block_hash: Hash, epoch: u64, key: &KeyPair) -> Self {
        let message = vote_message(chain_id, &block_hash, epoch);
        Self {
            voter: key.address(),
            block_hash,
            epoch,
            signature: key.sign(&message),
        }
    }

    /// Verify this vote's signature against the voter's public key in `validators`.
    pub fn verify(&self, chain_id: &str, validators: &ValidatorSet) -> Result<(), CryptoError> {
        let validator = validators
            .get(&self.voter)
            .ok_or(CryptoError::InvalidPublicKey)?;
        let message = vote_message(chain_id, &self.block_hash, self.epoch);
        validator.public_key.verify(&message, &self.signature)
    }
}

/// All votes collected for one block, at most one per voter.
///
/// Keyed on voter address with a `BTreeMap` so iteration order, and therefore
/// any serialization of the set, is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSet {
    block_hash: Hash,
    votes: BTreeMap<Address, Vote>,
}

impl VoteSet {
    pub fn new(block_hash: Hash) -> Self {
        Self {
            block_hash,
            votes: BTreeMap::new(),
        }
    }

    pub fn block_hash(&self) -> Hash {
        self.block_hash
    }

    /// Insert a vote. Returns false if this voter already has a vote recorded.
    ///
    /// The caller is responsible for signature and membership checks; the set
    /// only enforces the one-vote-per-voter invariant.
    pub fn add(&mut self, vote: Vote) -> bool {
        debug_assert_eq!(vote.block_hash, self.block_hash);
        match self.votes.entry(vote.voter) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(vote);
                true
            }
        }
    }

    pub fn get(&self, voter: &Address) -> Option<&Vote> {
        self.votes.get(voter)
    }

    pub fn contains(&self, voter: &Address) -> bool {
        self.votes.contains_key(voter)
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vote> {
        self.votes.values()
    }

    /// Sum of the voters' stakes.
    pub fn stake(&self, validators: &ValidatorSet) -> u64 {
        self.votes
            .keys()
            .map(|voter| validators.stake_of(voter))
            .sum()
    }

    /// Whether the voters' combined stake strictly exceeds ⅔ of total stake.
    pub fn has_quorum(&self, validators: &ValidatorSet) -> bool {
        validators.has_quorum(self.stake(validators))
    }
}

/// Proof that a quorum of stake voted for one block.
///
/// A block holding one of these is Committed; a block whose direct child also
/// holds one is Finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCertificate {
    pub block_hash: Hash,
    pub votes: VoteSet,
}

impl CommitCertificate {
    pub fn new(block_hash: Hash, votes: VoteSet) -> Self {
        Self { block_hash, votes }
    }

    /// Epoch of the highest-epoch vote in the certificate.
    pub fn epoch(&self) -> u64 {
        self.votes.iter().map(|v| v.epoch).max().unwrap_or(0)
    }

    /// Full validation: consistent block hash, known voters, valid
    /// signatures, and quorum stake.
    pub fn verify(
        &self,
        chain_id: &str,
        validators: &ValidatorSet,
    ) -> Result<(), CertificateError> {
        for vote in self.votes.iter() {
            if vote.block_hash != self.block_hash {
                return Err(CertificateError::WrongBlock {
                    vote: vote.block_hash,
                    certificate: self.block_hash,
                });
            }
            if !validators.contains(&vote.voter) {
                return Err(CertificateError::UnknownVoter(vote.voter));
            }
            vote.verify(chain_id, validators)
                .map_err(|_| CertificateError::BadSignature(vote.voter))?;
        }

        let stake = self.votes.stake(validators);
        if !validators.has_quorum(stake) {
            return Err(CertificateError::NoQuorum {
                stake,
                total: validators.total_stake(),
            });
        }
        Ok(())
    }
}
