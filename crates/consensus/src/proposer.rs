//! The proposer strategy: block building and vote aggregation.

use crate::engine::EngineCore;
use crate::vote_store::AddResult;
use tessera_core::{Action, ChannelId, Event, OutboundMessage};
use tessera_types::{Block, BlockHeader, Proposal, Vote};
use tracing::{info, trace, warn};

/// Builds proposals when leading an epoch, and aggregates votes.
///
/// Any node may aggregate; only the upcoming leader must, but universal
/// aggregation is the default.
pub trait ProposerStrategy: Send {
    /// The engine entered `epoch`; propose if we lead it. `mempool` is the
    /// reaped transaction view to draw from.
    fn enter_new_epoch(
        &mut self,
        core: &mut EngineCore,
        epoch: u64,
        mempool: &[Vec<u8>],
    ) -> Vec<Action>;

    /// Process one inbound vote.
    fn handle_vote(&mut self, core: &mut EngineCore, vote: Vote) -> Vec<Action>;
}

/// The default proposer.
#[derive(Debug, Default)]
pub struct DefaultProposerStrategy;

impl ProposerStrategy for DefaultProposerStrategy {
    fn enter_new_epoch(
        &mut self,
        core: &mut EngineCore,
        epoch: u64,
        mempool: &[Vec<u8>],
    ) -> Vec<Action> {
        if !core.is_leader(epoch) {
            trace!(
                epoch,
                leader = %core.leader(epoch).address,
                "Not the leader for this epoch"
            );
            return Vec::new();
        }

        // Fork choice: extend the deepest descendant of the highest
        // certified block.
        let (tip_hash, tip_height, tip_state, tip_timestamp, parent_certificate) = {
            let Some(tip) = core.tree.find_deepest_descendant(&core.highest_certified) else {
                warn!(
                    anchor = ?core.highest_certified,
                    "Fork-choice anchor missing from tree, skipping proposal"
                );
                return Vec::new();
            };
            (
                tip.hash(),
                tip.height(),
                tip.block.header.state_hash,
                tip.block.header.timestamp,
                tip.commit_certificate.clone(),
            )
        };
        core.tip = tip_hash;

        let transactions: Vec<Vec<u8>> = mempool
            .iter()
            .take(core.config.max_transactions_per_block)
            .cloned()
            .collect();

        // Timestamps must be monotone along the chain even when the local
        // clock lags the parent's proposer.
        let timestamp = core.now.as_secs().max(tip_timestamp);

        let header = BlockHeader::new(
            core.chain_id.clone(),
            epoch,
            tip_height + 1,
            tip_hash,
            tessera_types::transactions_root(&transactions),
            tip_state,
            timestamp,
            core.address,
        );
        let block = Block::new(header, transactions);

        info!(
            validator = %core.address,
            epoch,
            height = block.height(),
            block = ?block.hash(),
            parent = ?tip_hash,
            transactions = block.transactions.len(),
            carries_certificate = parent_certificate.is_some(),
            "Proposing block"
        );

        // If the tip holds a certificate the network may not have seen yet,
        // the proposal carries it; this is how certificates propagate.
        let proposal = Proposal::new(block, parent_certificate, &core.key);

        vec![
            Action::Broadcast {
                channel: ChannelId::Proposal,
                message: OutboundMessage::Proposal(proposal.clone()),
            },
            // Process our own proposal like any other: the replica inserts
            // it and votes for it.
            Action::EnqueueInternal {
                event: Event::ProposalReceived { proposal },
            },
        ]
    }

    fn handle_vote(&mut self, core: &mut EngineCore, vote: Vote) -> Vec<Action> {
        if core.is_stale(vote.epoch) {
            trace!(voter = %vote.voter, epoch = vote.epoch, "Dropping stale vote");
            return Vec::new();
        }

        match core.votes.record(&core.chain_id, vote, &core.validators) {
            Ok(AddResult::Added {
                certificate: Some(certificate),
            }) => vec![Action::EnqueueInternal {
                event: Event::CommitCertificateFormed {
                    block_hash: certificate.block_hash,
                    certificate,
                },
            }],
            Ok(AddResult::Added { certificate: None })
            | Ok(AddResult::Duplicate)
            // Equivocation evidence is retained by the store; the engine
            // carries on.
            | Ok(AddResult::Equivocation) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Rejected vote");
                Vec::new()
            }
        }
    }
}
