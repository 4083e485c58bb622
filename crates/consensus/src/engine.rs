//! The consensus engine.
//!
//! `EngineState` owns all consensus state: the block tree, the vote store,
//! the epoch manager, the validator set, the proposer and replica strategies,
//! and the three distinguished chain pointers (highest-certified block,
//! last-finalized block, tip). It is the only mutator of that state; external
//! readers go through [`EngineState::snapshot`].

use crate::config::ConsensusConfig;
use crate::epoch::EpochManager;
use crate::proposer::{DefaultProposerStrategy, ProposerStrategy};
use crate::replica::{DefaultReplicaStrategy, ReplicaStrategy};
use crate::schedule::{LeaderSchedule, RoundRobinStakeSchedule};
use crate::tree::BlockTree;
use crate::vote_store::{AddResult, VoteStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_core::{Action, Event};
use tessera_types::{
    Address, Block, BlockStatus, CommitCertificate, Hash, KeyPair, Validator, ValidatorSet,
};
use tracing::{debug, error, info, warn};

/// State recovered from storage on startup.
///
/// Passed to `EngineState::new()` to restore consensus state after a
/// crash/restart. For a fresh start, use `RecoveredState::default()`.
#[derive(Debug, Clone, Default)]
pub struct RecoveredState {
    /// Finalized blocks above genesis, in height order.
    pub finalized_blocks: Vec<Block>,

    /// Hash of the highest block known to hold a commit certificate.
    pub highest_certified: Option<Hash>,

    /// Hash of the last finalized block.
    pub last_finalized: Option<Hash>,

    /// Highest epoch this node has voted in.
    /// **Safety critical**: prevents double-voting after restart.
    pub last_vote_epoch: u64,
}

/// Copied view of the chain for external readers (RPC, dashboards).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain_id: String,
    pub epoch: u64,
    pub tip: Hash,
    pub tip_height: u64,
    pub highest_certified: Hash,
    pub last_finalized: Hash,
    pub last_finalized_height: u64,
    pub block_count: usize,
}

/// The mutable consensus state shared with the strategies.
///
/// Strategies receive `&mut EngineCore` per call; they hold no references
/// into it between events, so hot-swapping a strategy between epochs is
/// safe.
pub struct EngineCore {
    pub chain_id: String,
    pub key: KeyPair,
    pub address: Address,
    pub validators: ValidatorSet,
    pub schedule: Box<dyn LeaderSchedule>,
    pub config: ConsensusConfig,
    pub tree: BlockTree,
    pub votes: VoteStore,
    /// The local epoch, mirrored from the epoch manager.
    pub epoch: u64,
    pub highest_certified: Hash,
    pub last_finalized: Hash,
    pub tip: Hash,
    pub now: Duration,
}

impl EngineCore {
    /// The designated leader of `epoch`.
    pub fn leader(&self, epoch: u64) -> &Validator {
        self.schedule.leader(&self.validators, epoch)
    }

    /// Whether the local node leads `epoch`.
    pub fn is_leader(&self, epoch: u64) -> bool {
        self.leader(epoch).address == self.address
    }

    /// Whether a message at `epoch` is too far behind to be worth processing.
    pub fn is_stale(&self, epoch: u64) -> bool {
        epoch + self.config.stale_epoch_lag < self.epoch
    }

    /// Feed every vote of an externally received certificate into the vote
    /// store. The store re-checks signatures and quorum; if this pushes the
    /// block over the threshold, the resulting internal event is returned.
    pub fn ingest_certificate(&mut self, certificate: &CommitCertificate) -> Vec<Action> {
        let mut actions = Vec::new();
        for vote in certificate.votes.iter() {
            match self.votes.record(&self.chain_id, vote.clone(), &self.validators) {
                Ok(AddResult::Added {
                    certificate: Some(formed),
                }) => {
                    actions.push(Action::EnqueueInternal {
                        event: Event::CommitCertificateFormed {
                            block_hash: formed.block_hash,
                            certificate: formed,
                        },
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, block = ?certificate.block_hash,
                        "Rejecting embedded certificate");
                    return Vec::new();
                }
            }
        }

        // Quorum may have formed earlier (e.g. from gossiped votes) without
        // the block ever getting its certificate attached.
        if actions.is_empty() {
            if let Some(existing) = self.votes.certificate_for(&certificate.block_hash) {
                let unattached = self
                    .tree
                    .find(&certificate.block_hash)
                    .map(|b| !b.has_commit_certificate())
                    .unwrap_or(false);
                if unattached {
                    actions.push(Action::EnqueueInternal {
                        event: Event::CommitCertificateFormed {
                            block_hash: existing.block_hash,
                            certificate: existing,
                        },
                    });
                }
            }
        }
        actions
    }
}

/// The consensus engine state machine.
pub struct EngineState {
    core: EngineCore,
    epochs: EpochManager,
    proposer: Box<dyn ProposerStrategy>,
    replica: Box<dyn ReplicaStrategy>,
}

impl EngineState {
    /// Create an engine rooted at the genesis block for `chain_id`.
    pub fn new(
        chain_id: &str,
        key: KeyPair,
        validators: ValidatorSet,
        config: ConsensusConfig,
        recovered: RecoveredState,
    ) -> Self {
        let genesis = Block::genesis(chain_id);
        let root_hash = genesis.hash();
        let mut tree = BlockTree::new(genesis);

        // Reload the finalized chain; anything that fails to link is ignored
        // and re-synced from peers later.
        for block in recovered.finalized_blocks {
            let hash = block.hash();
            match tree.insert(block) {
                Ok(_) => {
                    let _ = tree.mark_finalized(&hash);
                }
                Err(e) => {
                    warn!(error = %e, block = ?hash, "Skipping unlinkable recovered block");
                    break;
                }
            }
        }

        let last_finalized = recovered
            .last_finalized
            .filter(|h| tree.contains(h))
            .unwrap_or(root_hash);
        let highest_certified = recovered
            .highest_certified
            .filter(|h| tree.contains(h))
            .unwrap_or(last_finalized);
        let tip = tree
            .find_deepest_descendant(&highest_certified)
            .map(|b| b.hash())
            .unwrap_or(highest_certified);

        // Resume the epoch clock above everything we have seen or signed, so
        // a restart can never re-vote in an old epoch.
        let resume_epoch = recovered
            .last_vote_epoch
            .max(tree.find(&highest_certified).map(|b| b.epoch()).unwrap_or(0));

        let address = key.address();
        let replica = DefaultReplicaStrategy::new(&config, recovered.last_vote_epoch);
        let epochs = EpochManager::new(resume_epoch, config.epoch_timeout);

        info!(
            chain_id,
            validator = %address,
            epoch = resume_epoch,
            height = tree.find(&last_finalized).map(|b| b.height()).unwrap_or(0),
            "Consensus engine initialized"
        );

        Self {
            core: EngineCore {
                chain_id: chain_id.to_string(),
                key,
                address,
                validators,
                schedule: Box::new(RoundRobinStakeSchedule),
                config,
                tree,
                votes: VoteStore::new(),
                epoch: resume_epoch,
                highest_certified,
                last_finalized,
                tip,
                now: Duration::ZERO,
            },
            epochs,
            proposer: Box::new(DefaultProposerStrategy),
            replica: Box::new(replica),
        }
    }

    /// Swap the proposer strategy. Only safe between epochs.
    pub fn set_proposer_strategy(&mut self, strategy: Box<dyn ProposerStrategy>) {
        self.proposer = strategy;
    }

    /// Swap the replica strategy. Only safe between epochs.
    pub fn set_replica_strategy(&mut self, strategy: Box<dyn ReplicaStrategy>) {
        self.replica = strategy;
    }

    /// Swap the leader schedule. Only safe between epochs, and every
    /// validator must swap identically or the network forks.
    pub fn set_leader_schedule(&mut self, schedule: Box<dyn LeaderSchedule>) {
        self.core.schedule = schedule;
    }

    /// Initial actions: arm the epoch clock.
    pub fn start(&self) -> Vec<Action> {
        vec![self.epochs.arm_timer()]
    }

    pub fn set_time(&mut self, now: Duration) {
        self.core.now = now;
    }

    pub fn now(&self) -> Duration {
        self.core.now
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event handlers
    // ═══════════════════════════════════════════════════════════════════════

    /// Dispatch an event. `mempool` supplies the transactions a proposal
    /// would carry; pass the reaped view for timer and certificate events.
    pub fn handle_with_mempool(&mut self, event: Event, mempool: &[Vec<u8>]) -> Vec<Action> {
        match event {
            Event::EpochTimer => self.on_epoch_timer(mempool),
            Event::ProposalReceived { proposal } => self.on_proposal(proposal),
            Event::VoteReceived { vote } => self.on_vote(vote),
            Event::CommitCertificateFormed {
                block_hash,
                certificate,
            } => self.on_certificate_formed(block_hash, certificate, mempool),
            // Mempool events are handled outside the engine.
            Event::BlockFinalized { .. }
            | Event::TransactionSubmitted { .. }
            | Event::TransactionReceived { .. } => Vec::new(),
        }
    }

    /// The epoch timeout elapsed: advance the logical clock.
    pub fn on_epoch_timer(&mut self, mempool: &[Vec<u8>]) -> Vec<Action> {
        let epoch = self.epochs.on_timeout();
        debug!(validator = %self.core.address, epoch, "Epoch timer fired");

        let mut actions = vec![self.epochs.arm_timer()];
        actions.extend(self.enter_new_epoch(epoch, mempool));
        actions
    }

    /// Inbound proposal: replica's business.
    pub fn on_proposal(&mut self, proposal: tessera_types::Proposal) -> Vec<Action> {
        self.replica.handle_proposal(&mut self.core, proposal)
    }

    /// Inbound vote: proposer's business (every node aggregates).
    pub fn on_vote(&mut self, vote: tessera_types::Vote) -> Vec<Action> {
        self.proposer.handle_vote(&mut self.core, vote)
    }

    /// A commit certificate formed for `block_hash`.
    pub fn on_certificate_formed(
        &mut self,
        block_hash: Hash,
        certificate: CommitCertificate,
        mempool: &[Vec<u8>],
    ) -> Vec<Action> {
        let Some(block) = self.core.tree.find(&block_hash) else {
            // Votes can certify a block we have not received yet; the
            // replica re-raises this event once the proposal arrives.
            debug!(block = ?block_hash, "Certificate for unknown block, deferring");
            return Vec::new();
        };
        let height = block.height();
        let parent_hash = block.parent_hash();
        let block_epoch = block.epoch();

        if self.core.tree.attach_certificate(&block_hash, certificate) {
            info!(
                validator = %self.core.address,
                block = ?block_hash,
                height,
                "Commit certificate attached"
            );
        }

        let mut actions = Vec::new();

        // 1. Fork choice re-anchors on the highest certified block.
        let highest_height = self
            .core
            .tree
            .find(&self.core.highest_certified)
            .map(|b| b.height())
            .unwrap_or(0);
        if height > highest_height {
            self.core.highest_certified = block_hash;
            self.core.tip = self
                .core
                .tree
                .find_deepest_descendant(&block_hash)
                .map(|b| b.hash())
                .unwrap_or(block_hash);
            actions.push(Action::PersistChainState {
                highest_certified: self.core.highest_certified,
                last_finalized: self.core.last_finalized,
            });
        }

        // 2. Two-chain rule: the parent is final once both it and this block
        //    hold certificates.
        let parent_certified = self
            .core
            .tree
            .find(&parent_hash)
            .map(|p| p.has_commit_certificate())
            .unwrap_or(false);
        if parent_certified {
            actions.extend(self.finalize(parent_hash));
        }

        // 3. A certificate at or above the local epoch moves the clock.
        if block_epoch >= self.core.epoch {
            if let Some(new_epoch) = self.epochs.jump_to(block_epoch + 1) {
                debug!(
                    validator = %self.core.address,
                    epoch = new_epoch,
                    "Advancing epoch on certificate"
                );
                actions.push(self.epochs.arm_timer());
                actions.extend(self.enter_new_epoch(new_epoch, mempool));
            }
        }

        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    fn enter_new_epoch(&mut self, epoch: u64, mempool: &[Vec<u8>]) -> Vec<Action> {
        self.core.epoch = epoch;
        self.replica.enter_new_epoch(epoch);
        self.proposer.enter_new_epoch(&mut self.core, epoch, mempool)
    }

    /// Finalize `target` and every not-yet-finalized ancestor between it and
    /// the last finalized block, oldest first.
    fn finalize(&mut self, target: Hash) -> Vec<Action> {
        if target == self.core.last_finalized {
            return Vec::new();
        }
        match self.core.tree.find(&target) {
            Some(block) if block.status == BlockStatus::Finalized => {
                // An ancestor of the last finalized block; nothing to do.
                return Vec::new();
            }
            Some(_) => {}
            None => self.fatal(format!("finalization target {target} missing from tree")),
        }

        // Walk back to the last finalized block. Reaching any *other*
        // finalized block first would mean two finalized branches exist,
        // which the voting rule is supposed to make impossible.
        let mut path = Vec::new();
        let mut cursor = target;
        while cursor != self.core.last_finalized {
            let Some(block) = self.core.tree.find(&cursor) else {
                self.fatal(format!("broken parent chain at {cursor} during finalization"));
            };
            if block.status == BlockStatus::Finalized {
                self.fatal(format!(
                    "finalized fork: {target} does not descend from {}",
                    self.core.last_finalized
                ));
            }
            path.push(cursor);
            cursor = block.parent_hash();
        }

        let mut actions = Vec::new();
        for hash in path.iter().rev() {
            if self.core.tree.mark_finalized(hash).is_err() {
                self.fatal(format!("block {hash} vanished during finalization"));
            }
            let block = self
                .core
                .tree
                .find(hash)
                .map(|b| b.block.clone())
                .unwrap_or_else(|| self.fatal(format!("block {hash} vanished during finalization")));

            info!(
                validator = %self.core.address,
                block = ?hash,
                height = block.height(),
                "Finalizing block"
            );
            actions.push(Action::PersistBlock {
                block: block.clone(),
            });
            actions.push(Action::EmitFinalizedBlock {
                block: block.clone(),
            });
            actions.push(Action::EnqueueInternal {
                event: Event::BlockFinalized { block },
            });
        }

        self.core.last_finalized = target;
        actions.push(Action::PersistChainState {
            highest_certified: self.core.highest_certified,
            last_finalized: target,
        });

        // Votes for blocks at or below the finalized height can no longer
        // influence anything.
        let (final_height, final_epoch) = self
            .core
            .tree
            .find(&target)
            .map(|b| (b.height(), b.epoch()))
            .unwrap_or((0, 0));
        let EngineCore {
            ref tree,
            ref mut votes,
            ..
        } = self.core;
        votes.prune(final_epoch, |hash| {
            tree.find(hash)
                .map(|b| b.height() > final_height)
                .unwrap_or(true)
        });

        actions
    }

    /// Unrecoverable state corruption: log and abort. Recovery requires
    /// operator action.
    fn fatal(&self, reason: String) -> ! {
        error!(
            validator = %self.core.address,
            last_finalized = ?self.core.last_finalized,
            highest_certified = ?self.core.highest_certified,
            reason,
            "Fatal invariant violation"
        );
        panic!("fatal invariant violation: {reason}");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn epoch(&self) -> u64 {
        self.core.epoch
    }

    pub fn tip(&self) -> Hash {
        self.core.tip
    }

    pub fn highest_certified(&self) -> Hash {
        self.core.highest_certified
    }

    pub fn last_finalized(&self) -> Hash {
        self.core.last_finalized
    }

    pub fn tree(&self) -> &BlockTree {
        &self.core.tree
    }

    pub fn vote_store(&self) -> &VoteStore {
        &self.core.votes
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.core.config
    }

    pub fn address(&self) -> Address {
        self.core.address
    }

    /// Copy the externally visible chain state.
    pub fn snapshot(&self) -> ChainSnapshot {
        let tip_height = self
            .core
            .tree
            .find(&self.core.tip)
            .map(|b| b.height())
            .unwrap_or(0);
        let last_finalized_height = self
            .core
            .tree
            .find(&self.core.last_finalized)
            .map(|b| b.height())
            .unwrap_or(0);
        ChainSnapshot {
            chain_id: self.core.chain_id.clone(),
            epoch: self.core.epoch,
            tip: self.core.tip,
            tip_height,
            highest_certified: self.core.highest_certified,
            last_finalized: self.core.last_finalized,
            last_finalized_height,
            block_count: self.core.tree.len(),
        }
    }
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState")
            .field("validator", &self.core.address)
            .field("epoch", &self.core.epoch)
            .field("tip", &self.core.tip)
            .field("highest_certified", &self.core.highest_certified)
            .field("last_finalized", &self.core.last_finalized)
            .field("blocks", &self.core.tree.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ChannelId;
    use tessera_types::{Proposal, Vote};

    fn make_keys(n: usize) -> Vec<KeyPair> {
        (0..n)
            .map(|i| KeyPair::from_seed(&[i as u8 + 1; 32]))
            .collect()
    }

    fn make_validator_set(keys: &[KeyPair]) -> ValidatorSet {
        ValidatorSet::new(
            keys.iter()
                .map(|k| Validator::new(k.public_key(), 1))
                .collect(),
        )
    }

    fn make_engine(keys: &[KeyPair], index: usize) -> EngineState {
        let mut engine = EngineState::new(
            "test",
            keys[index].clone(),
            make_validator_set(keys),
            ConsensusConfig::default(),
            RecoveredState::default(),
        );
        engine.set_time(Duration::from_secs(100));
        engine
    }

    /// Drain `EnqueueInternal` actions through the engine, collecting every
    /// other action produced along the way. A miniature runner.
    fn drain(engine: &mut EngineState, mut pending: Vec<Action>) -> Vec<Action> {
        let mut out = Vec::new();
        while let Some(action) = pending.pop() {
            match action {
                Action::EnqueueInternal { event } => {
                    pending.extend(engine.handle_with_mempool(event, &[]));
                }
                other => out.push(other),
            }
        }
        out
    }

    fn proposal_broadcast(actions: &[Action]) -> Option<Proposal> {
        actions.iter().find_map(|a| match a {
            Action::Broadcast {
                channel: ChannelId::Proposal,
                message: tessera_core::OutboundMessage::Proposal(p),
            } => Some(p.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_leader_proposes_on_epoch_timer() {
        let keys = make_keys(4);
        // With four equal stakes, epoch 1 belongs to validator index 1.
        let mut engine = make_engine(&keys, 1);

        let actions = engine.on_epoch_timer(&[]);
        let proposal = proposal_broadcast(&actions).expect("leader should propose");
        assert_eq!(proposal.epoch(), 1);
        assert_eq!(proposal.height(), 1);
        assert_eq!(proposal.block.header.parent, engine.tree().root_hash());
    }

    #[test]
    fn test_non_leader_stays_silent() {
        let keys = make_keys(4);
        let mut engine = make_engine(&keys, 2);

        let actions = engine.on_epoch_timer(&[]);
        assert!(proposal_broadcast(&actions).is_none());
        // The timer is always re-armed.
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SetTimer { .. })));
    }

    #[test]
    fn test_straight_line_finalization() {
        // Scenario: epoch 1 leader proposes B1, all vote, CC(B1) forms;
        // epoch 2 leader proposes B2 carrying CC(B1), all vote, CC(B2)
        // forms, and B1 finalizes.
        let keys = make_keys(4);
        let mut engine = make_engine(&keys, 1);

        // Epoch 1: our engine is the leader; its proposal loops back and it
        // votes for its own block.
        let actions = engine.on_epoch_timer(&[]);
        let b1 = proposal_broadcast(&actions).unwrap();
        drain(&mut engine, actions);

        // Votes from the other three validators.
        let mut actions = Vec::new();
        for key in [&keys[0], &keys[2], &keys[3]] {
            actions.extend(engine.on_vote(Vote::new("test", b1.block.hash(), 1, key)));
        }
        drain(&mut engine, actions);

        assert_eq!(engine.highest_certified(), b1.block.hash());
        assert_eq!(engine.epoch(), 2);
        assert_eq!(engine.last_finalized(), engine.tree().root_hash());

        // Epoch 2: validator 2 leads and extends B1, carrying its CC.
        let cc_b1 = engine
            .vote_store()
            .certificate_for(&b1.block.hash())
            .expect("B1 certified");
        let header = tessera_types::BlockHeader::new(
            "test".to_string(),
            2,
            2,
            b1.block.hash(),
            tessera_types::transactions_root(&[]),
            Hash::ZERO,
            b1.block.header.timestamp + 1,
            keys[2].address(),
        );
        let b2 = Proposal::new(Block::new(header, vec![]), Some(cc_b1), &keys[2]);

        let actions = engine.on_proposal(b2.clone());
        drain(&mut engine, actions);

        let mut actions = Vec::new();
        for key in [&keys[0], &keys[2], &keys[3]] {
            actions.extend(engine.on_vote(Vote::new("test", b2.block.hash(), 2, key)));
        }
        let emitted = drain(&mut engine, actions);

        // B1 is final, B2 is the highest certified block.
        assert_eq!(engine.last_finalized(), b1.block.hash());
        assert_eq!(engine.highest_certified(), b2.block.hash());
        assert_eq!(
            engine.tree().find(&b1.block.hash()).unwrap().status,
            BlockStatus::Finalized
        );
        assert!(emitted.iter().any(|a| matches!(
            a,
            Action::EmitFinalizedBlock { block } if block.hash() == b1.block.hash()
        )));
    }

    #[test]
    fn test_orphan_proposal_recovered_when_parent_arrives() {
        let keys = make_keys(4);
        // Observer engine, not a leader in the epochs below.
        let mut engine = make_engine(&keys, 3);

        let genesis_hash = engine.tree().root_hash();
        let b1_header = tessera_types::BlockHeader::new(
            "test".to_string(),
            1,
            1,
            genesis_hash,
            tessera_types::transactions_root(&[]),
            Hash::ZERO,
            100,
            keys[1].address(),
        );
        let b1 = Proposal::new(Block::new(b1_header, vec![]), None, &keys[1]);

        let b2_header = tessera_types::BlockHeader::new(
            "test".to_string(),
            2,
            2,
            b1.block.hash(),
            tessera_types::transactions_root(&[]),
            Hash::ZERO,
            101,
            keys[2].address(),
        );
        let b2 = Proposal::new(Block::new(b2_header, vec![]), None, &keys[2]);

        // Child before parent: buffered, not inserted.
        engine.on_proposal(b2.clone());
        assert!(!engine.tree().contains(&b2.block.hash()));

        // Parent arrives; the orphan is adopted.
        engine.on_proposal(b1.clone());
        assert!(engine.tree().contains(&b1.block.hash()));
        assert!(engine.tree().contains(&b2.block.hash()));
    }

    #[test]
    fn test_proposal_from_wrong_leader_dropped() {
        let keys = make_keys(4);
        let mut engine = make_engine(&keys, 3);

        // Epoch 1 belongs to validator 1; validator 2 proposes anyway.
        let header = tessera_types::BlockHeader::new(
            "test".to_string(),
            1,
            1,
            engine.tree().root_hash(),
            tessera_types::transactions_root(&[]),
            Hash::ZERO,
            100,
            keys[2].address(),
        );
        let forged = Proposal::new(Block::new(header, vec![]), None, &keys[2]);

        let actions = engine.on_proposal(forged.clone());
        assert!(actions.is_empty());
        assert!(!engine.tree().contains(&forged.block.hash()));
    }

    #[test]
    fn test_stale_vote_dropped_silently() {
        let keys = make_keys(4);
        let mut engine = make_engine(&keys, 0);

        // Move the local clock far ahead.
        for _ in 0..12 {
            engine.on_epoch_timer(&[]);
        }
        assert_eq!(engine.epoch(), 12);

        let stale = Vote::new("test", Hash::new([9u8; 32]), 1, &keys[2]);
        let actions = engine.on_vote(stale);
        assert!(actions.is_empty());
        assert!(engine.vote_store().votes_for(&Hash::new([9u8; 32])).is_none());
    }

    #[test]
    fn test_no_double_vote_within_epoch() {
        let keys = make_keys(4);
        // Validator 3 is a pure replica in epoch 1.
        let mut engine = make_engine(&keys, 3);
        engine.on_epoch_timer(&[]); // enter epoch 1

        let make_proposal = |seed: u8, root: Hash| {
            let header = tessera_types::BlockHeader::new(
                "test".to_string(),
                1,
                1,
                root,
                tessera_types::transactions_root(&[vec![seed]]),
                Hash::ZERO,
                100,
                keys[1].address(),
            );
            Proposal::new(
                Block::new(header, vec![vec![seed]]),
                None,
                &keys[1],
            )
        };

        let root = engine.tree().root_hash();
        let first = make_proposal(1, root);
        let second = make_proposal(2, root);

        let actions = engine.on_proposal(first);
        let voted_first = actions
            .iter()
            .any(|a| matches!(a, Action::Broadcast { channel: ChannelId::Vote, .. }));
        assert!(voted_first);

        // A second proposal in the same epoch gets no vote.
        let actions = engine.on_proposal(second.clone());
        let voted_second = actions
            .iter()
            .any(|a| matches!(a, Action::Broadcast { channel: ChannelId::Vote, .. }));
        assert!(!voted_second);
        // But the block itself is still admitted to the tree.
        assert!(engine.tree().contains(&second.block.hash()));
    }

    #[test]
    fn test_vote_persisted_before_broadcast() {
        let keys = make_keys(4);
        let mut engine = make_engine(&keys, 3);
        engine.on_epoch_timer(&[]);

        let header = tessera_types::BlockHeader::new(
            "test".to_string(),
            1,
            1,
            engine.tree().root_hash(),
            tessera_types::transactions_root(&[]),
            Hash::ZERO,
            100,
            keys[1].address(),
        );
        let proposal = Proposal::new(Block::new(header, vec![]), None, &keys[1]);

        let actions = engine.on_proposal(proposal);
        let persist_at = actions
            .iter()
            .position(|a| matches!(a, Action::PersistOwnVote { epoch: 1 }));
        let broadcast_at = actions
            .iter()
            .position(|a| matches!(a, Action::Broadcast { channel: ChannelId::Vote, .. }));
        assert!(persist_at.is_some());
        assert!(broadcast_at.is_some());
        assert!(persist_at < broadcast_at, "persist must precede broadcast");
    }

    #[test]
    fn test_restart_does_not_revote_old_epoch() {
        let keys = make_keys(4);
        let recovered = RecoveredState {
            last_vote_epoch: 5,
            ..Default::default()
        };
        let engine = EngineState::new(
            "test",
            keys[3].clone(),
            make_validator_set(&keys),
            ConsensusConfig::default(),
            recovered,
        );
        assert_eq!(engine.epoch(), 5);
    }
}
