//! The replica strategy: proposal validation and voting.

use crate::engine::EngineCore;
use crate::orphan::OrphanPool;
use crate::tree::BlockTreeError;
use crate::ConsensusConfig;
use tessera_core::{Action, ChannelId, Event, OutboundMessage};
use tessera_types::{Proposal, Vote};
use tracing::{debug, trace, warn};

/// Receives proposals, decides whether to vote, emits the vote.
pub trait ReplicaStrategy: Send {
    /// Notification that the engine entered `epoch`.
    fn enter_new_epoch(&mut self, epoch: u64);

    /// Process one inbound proposal to completion.
    fn handle_proposal(&mut self, core: &mut EngineCore, proposal: Proposal) -> Vec<Action>;
}

/// The default replica.
///
/// Voting rule: vote for a proposed block iff all of
/// 1. its epoch equals the local epoch,
/// 2. this node has not voted in that epoch yet,
/// 3. its parent is the highest-certified block or a descendant of it,
/// 4. its header passed well-formedness checks on insertion.
pub struct DefaultReplicaStrategy {
    /// Highest epoch this node has voted in. Persisted before each vote is
    /// broadcast so a restart cannot produce a second vote in the same epoch.
    last_vote_epoch: u64,
    orphans: OrphanPool,
}

impl DefaultReplicaStrategy {
    pub fn new(config: &ConsensusConfig, last_vote_epoch: u64) -> Self {
        Self {
            last_vote_epoch,
            orphans: OrphanPool::new(config.orphan_pool_capacity),
        }
    }

    /// Apply the voting rule and, if it passes, produce the vote actions.
    fn maybe_vote(&mut self, core: &mut EngineCore, proposal: &Proposal) -> Vec<Action> {
        let epoch = proposal.epoch();
        let block_hash = proposal.block.hash();

        if epoch != core.epoch {
            trace!(
                block = ?block_hash,
                epoch,
                local = core.epoch,
                "Not voting: proposal is not for the current epoch"
            );
            return Vec::new();
        }
        if epoch <= self.last_vote_epoch {
            trace!(
                block = ?block_hash,
                epoch,
                last_vote_epoch = self.last_vote_epoch,
                "Not voting: already voted in this epoch"
            );
            return Vec::new();
        }
        if !core
            .tree
            .is_ancestor(&core.highest_certified, &proposal.block.header.parent)
        {
            warn!(
                block = ?block_hash,
                parent = ?proposal.block.header.parent,
                anchor = ?core.highest_certified,
                "Not voting: parent is off the certified branch"
            );
            return Vec::new();
        }

        self.last_vote_epoch = epoch;
        let vote = Vote::new(&core.chain_id, block_hash, epoch, &core.key);

        debug!(
            validator = %core.address,
            block = ?block_hash,
            epoch,
            "Voting for block"
        );

        // The vote epoch is persisted before anything leaves this node; a
        // crash between persist and broadcast costs a vote, never safety.
        let mut actions = vec![Action::PersistOwnVote { epoch }];

        let leader = core.leader(epoch).address;
        if leader != core.address {
            actions.push(Action::SendToValidator {
                validator: leader,
                channel: ChannelId::Vote,
                message: OutboundMessage::Vote(vote.clone()),
            });
        }
        actions.push(Action::Broadcast {
            channel: ChannelId::Vote,
            message: OutboundMessage::Vote(vote.clone()),
        });
        // Aggregate our own vote locally as well.
        actions.push(Action::EnqueueInternal {
            event: Event::VoteReceived { vote },
        });
        actions
    }
}

impl ReplicaStrategy for DefaultReplicaStrategy {
    fn enter_new_epoch(&mut self, _epoch: u64) {}

    fn handle_proposal(&mut self, core: &mut EngineCore, proposal: Proposal) -> Vec<Action> {
        let epoch = proposal.epoch();
        let block_hash = proposal.block.hash();

        if core.is_stale(epoch) {
            trace!(block = ?block_hash, epoch, "Dropping stale proposal");
            return Vec::new();
        }

        // The proposer must be the epoch's leader, and the signature theirs.
        let (leader_address, leader_key) = {
            let leader = core.leader(epoch);
            (leader.address, leader.public_key)
        };
        if proposal.block.header.proposer != leader_address {
            warn!(
                block = ?block_hash,
                epoch,
                proposer = %proposal.block.header.proposer,
                expected = %leader_address,
                "Dropping proposal from non-leader"
            );
            return Vec::new();
        }
        if proposal.verify_signature(&leader_key).is_err() {
            warn!(block = ?block_hash, epoch, "Dropping proposal with bad signature");
            return Vec::new();
        }

        match core.tree.insert(proposal.block.clone()) {
            Ok(_) => {}
            Err(BlockTreeError::OrphanParent(parent)) => {
                debug!(block = ?block_hash, parent = ?parent, "Buffering orphan proposal");
                self.orphans.insert(proposal);
                return Vec::new();
            }
            Err(BlockTreeError::Duplicate(_)) => {
                // Already known, e.g. our own proposal looping back. The
                // embedded certificate may still be news.
                trace!(block = ?block_hash, "Proposal for known block");
            }
            Err(e) => {
                warn!(block = ?block_hash, error = %e, "Dropping invalid proposal");
                return Vec::new();
            }
        }

        let mut actions = Vec::new();

        // A certificate for the parent rides along with the proposal; hand
        // it to the vote store, which attaches and may trigger finalization.
        if let Some(certificate) = &proposal.parent_certificate {
            if certificate.block_hash == proposal.block.header.parent {
                actions.extend(core.ingest_certificate(certificate));
            } else {
                warn!(
                    block = ?block_hash,
                    certified = ?certificate.block_hash,
                    "Embedded certificate is not for the parent, ignoring"
                );
            }
        }

        // Votes sometimes outrun the proposal; if quorum already exists for
        // this block, surface the certificate now.
        if let Some(certificate) = core.votes.certificate_for(&block_hash) {
            let unattached = core
                .tree
                .find(&block_hash)
                .map(|b| !b.has_commit_certificate())
                .unwrap_or(false);
            if unattached {
                actions.push(Action::EnqueueInternal {
                    event: Event::CommitCertificateFormed {
                        block_hash,
                        certificate,
                    },
                });
            }
        }

        actions.extend(self.maybe_vote(core, &proposal));

        // Anything buffered under this block can now be admitted.
        for orphan in self.orphans.take_children(&block_hash) {
            actions.extend(self.handle_proposal(core, orphan));
        }

        actions
    }
}
