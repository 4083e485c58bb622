//! Vote aggregation and commit-certificate formation.

use std::collections::{HashMap, HashSet};
use tessera_types::{Address, CommitCertificate, Hash, ValidatorSet, Vote, VoteSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors rejecting a vote outright.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoteError {
    #[error("voter {0} is not in the validator set")]
    UnknownVoter(Address),

    #[error("invalid vote signature from {0}")]
    InvalidSignature(Address),
}

/// Outcome of recording a vote.
#[derive(Debug, Clone)]
pub enum AddResult {
    /// The vote was stored. If it was the one that formed quorum, the fresh
    /// commit certificate rides along.
    Added {
        certificate: Option<CommitCertificate>,
    },
    /// The identical (voter, block) vote was already stored.
    Duplicate,
    /// The vote conflicts with an earlier vote by the same voter; evidence
    /// was retained and the vote refused.
    Equivocation,
}

/// Retained proof of a conflicting vote pair.
#[derive(Debug, Clone)]
pub struct EquivocationEvidence {
    pub first: Vote,
    pub second: Vote,
}

/// Aggregates votes per block and detects quorum.
///
/// Certificate formation is idempotent: the first vote to push a block's
/// vote set over the quorum threshold yields a certificate snapshot; later
/// votes are stored but do not re-trigger.
#[derive(Debug, Default)]
pub struct VoteStore {
    sets: HashMap<Hash, VoteSet>,
    /// (voter, epoch) → block voted for, to catch cross-block double votes.
    by_epoch: HashMap<(Address, u64), Hash>,
    /// Blocks whose vote set already produced a certificate.
    certified: HashSet<Hash>,
    evidence: Vec<EquivocationEvidence>,
}

impl VoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one vote.
    ///
    /// Verifies membership and the signature inline, enforces the
    /// one-vote-per-voter-per-block and one-block-per-voter-per-epoch
    /// invariants, and reports a certificate the first time the block's
    /// voter stake strictly exceeds ⅔ of the total.
    pub fn record(
        &mut self,
        chain_id: &str,
        vote: Vote,
        validators: &ValidatorSet,
    ) -> Result<AddResult, VoteError> {
        if !validators.contains(&vote.voter) {
            return Err(VoteError::UnknownVoter(vote.voter));
        }
        vote.verify(chain_id, validators)
            .map_err(|_| VoteError::InvalidSignature(vote.voter))?;

        // Same voter, same block: either an exact duplicate or a second
        // signature over conflicting content.
        if let Some(existing) = self.sets.get(&vote.block_hash).and_then(|s| s.get(&vote.voter)) {
            if *existing == vote {
                return Ok(AddResult::Duplicate);
            }
            warn!(
                voter = ?vote.voter,
                block = ?vote.block_hash,
                "Conflicting duplicate vote for the same block"
            );
            self.evidence.push(EquivocationEvidence {
                first: existing.clone(),
                second: vote,
            });
            return Ok(AddResult::Equivocation);
        }

        // Same voter, same epoch, different block: a double vote.
        let epoch_key = (vote.voter, vote.epoch);
        if let Some(voted_block) = self.by_epoch.get(&epoch_key) {
            if *voted_block != vote.block_hash {
                warn!(
                    voter = ?vote.voter,
                    epoch = vote.epoch,
                    first = ?voted_block,
                    second = ?vote.block_hash,
                    "Equivocation: voter signed two blocks in one epoch"
                );
                let first = self
                    .sets
                    .get(voted_block)
                    .and_then(|s| s.get(&vote.voter))
                    .cloned();
                if let Some(first) = first {
                    self.evidence.push(EquivocationEvidence {
                        first,
                        second: vote,
                    });
                }
                return Ok(AddResult::Equivocation);
            }
        }

        let set = self
            .sets
            .entry(vote.block_hash)
            .or_insert_with(|| VoteSet::new(vote.block_hash));
        let block_hash = vote.block_hash;
        if !set.add(vote.clone()) {
            return Ok(AddResult::Duplicate);
        }
        self.by_epoch.insert(epoch_key, block_hash);

        debug!(
            voter = ?epoch_key.0,
            block = ?block_hash,
            stake = set.stake(validators),
            total = validators.total_stake(),
            "Vote recorded"
        );

        let certificate = if !self.certified.contains(&block_hash) && set.has_quorum(validators)
        {
            self.certified.insert(block_hash);
            info!(
                block = ?block_hash,
                stake = set.stake(validators),
                "Quorum reached, forming commit certificate"
            );
            Some(CommitCertificate::new(block_hash, set.clone()))
        } else {
            None
        };

        Ok(AddResult::Added { certificate })
    }

    /// The certificate snapshot for a block that already reached quorum.
    pub fn certificate_for(&self, block_hash: &Hash) -> Option<CommitCertificate> {
        if !self.certified.contains(block_hash) {
            return None;
        }
        self.sets
            .get(block_hash)
            .map(|set| CommitCertificate::new(*block_hash, set.clone()))
    }

    /// Votes currently held for a block.
    pub fn votes_for(&self, block_hash: &Hash) -> Option<&VoteSet> {
        self.sets.get(block_hash)
    }

    /// Equivocation evidence retained for external slashing.
    pub fn evidence(&self) -> &[EquivocationEvidence] {
        &self.evidence
    }

    /// Drop vote sets for blocks the caller no longer needs (ancestors of
    /// the finalized block) and epoch entries below `min_epoch`.
    pub fn prune(&mut self, min_epoch: u64, retain_block: impl Fn(&Hash) -> bool) {
        self.sets.retain(|hash, _| retain_block(hash));
        let sets = &self.sets;
        self.certified.retain(|hash| sets.contains_key(hash));
        self.by_epoch.retain(|(_, epoch), _| *epoch >= min_epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{keccak256, KeyPair, Validator};

    fn make_validators(n: usize) -> (Vec<KeyPair>, ValidatorSet) {
        let keys: Vec<KeyPair> = (0..n)
            .map(|i| KeyPair::from_seed(&[i as u8 + 1; 32]))
            .collect();
        let set = ValidatorSet::new(
            keys.iter()
                .map(|k| Validator::new(k.public_key(), 1))
                .collect(),
        );
        (keys, set)
    }

    #[test]
    fn test_certificate_forms_exactly_once() {
        let (keys, validators) = make_validators(4);
        let mut store = VoteStore::new();
        let block = keccak256(b"block");

        // Two votes: no quorum yet.
        for key in keys.iter().take(2) {
            let result = store
                .record("test", Vote::new("test", block, 1, key), &validators)
                .unwrap();
            assert!(matches!(result, AddResult::Added { certificate: None }));
        }

        // Third vote crosses the threshold.
        let result = store
            .record("test", Vote::new("test", block, 1, &keys[2]), &validators)
            .unwrap();
        let AddResult::Added {
            certificate: Some(cc),
        } = result
        else {
            panic!("expected certificate, got {:?}", result);
        };
        assert_eq!(cc.block_hash, block);
        assert_eq!(cc.votes.len(), 3);

        // Fourth vote is stored but does not re-trigger.
        let result = store
            .record("test", Vote::new("test", block, 1, &keys[3]), &validators)
            .unwrap();
        assert!(matches!(result, AddResult::Added { certificate: None }));
        assert_eq!(store.certificate_for(&block).unwrap().votes.len(), 4);
    }

    #[test]
    fn test_duplicate_vote() {
        let (keys, validators) = make_validators(4);
        let mut store = VoteStore::new();
        let block = keccak256(b"block");
        let vote = Vote::new("test", block, 1, &keys[0]);

        store.record("test", vote.clone(), &validators).unwrap();
        let result = store.record("test", vote, &validators).unwrap();
        assert!(matches!(result, AddResult::Duplicate));
    }

    #[test]
    fn test_double_vote_across_blocks_is_equivocation() {
        let (keys, validators) = make_validators(4);
        let mut store = VoteStore::new();

        let first = Vote::new("test", keccak256(b"a"), 1, &keys[0]);
        let second = Vote::new("test", keccak256(b"b"), 1, &keys[0]);

        store.record("test", first, &validators).unwrap();
        let result = store.record("test", second, &validators).unwrap();
        assert!(matches!(result, AddResult::Equivocation));
        assert_eq!(store.evidence().len(), 1);

        // The conflicting vote did not enter the set.
        assert!(store.votes_for(&keccak256(b"b")).is_none());
    }

    #[test]
    fn test_same_voter_next_epoch_is_fine() {
        let (keys, validators) = make_validators(4);
        let mut store = VoteStore::new();

        store
            .record("test", Vote::new("test", keccak256(b"a"), 1, &keys[0]), &validators)
            .unwrap();
        let result = store
            .record("test", Vote::new("test", keccak256(b"b"), 2, &keys[0]), &validators)
            .unwrap();
        assert!(matches!(result, AddResult::Added { .. }));
        assert!(store.evidence().is_empty());
    }

    #[test]
    fn test_outsider_rejected() {
        let (_, validators) = make_validators(4);
        let outsider = KeyPair::from_seed(&[42u8; 32]);
        let mut store = VoteStore::new();

        let result = store.record(
            "test",
            Vote::new("test", keccak256(b"a"), 1, &outsider),
            &validators,
        );
        assert!(matches!(result, Err(VoteError::UnknownVoter(_))));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let (keys, validators) = make_validators(4);
        let mut store = VoteStore::new();

        let mut vote = Vote::new("test", keccak256(b"a"), 1, &keys[0]);
        vote.epoch = 5; // signature no longer covers the claimed epoch
        let result = store.record("test", vote, &validators);
        assert!(matches!(result, Err(VoteError::InvalidSignature(_))));
    }

    #[test]
    fn test_prune_drops_old_sets() {
        let (keys, validators) = make_validators(4);
        let mut store = VoteStore::new();
        let old = keccak256(b"old");
        let new = keccak256(b"new");

        store
            .record("test", Vote::new("test", old, 1, &keys[0]), &validators)
            .unwrap();
        store
            .record("test", Vote::new("test", new, 5, &keys[0]), &validators)
            .unwrap();

        store.prune(5, |hash| *hash != old);
        assert!(store.votes_for(&old).is_none());
        assert!(store.votes_for(&new).is_some());
    }
}
