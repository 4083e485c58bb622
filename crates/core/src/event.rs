//! Event types for the deterministic state machine.

use tessera_types::{Block, CommitCertificate, Hash, Proposal, Vote};

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
///
/// This ensures causality is preserved: internal events (consequences of
/// processing an event) are handled before new external inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    /// Processed first to maintain causality.
    Internal = 0,

    /// Timer events: scheduled by the node itself.
    Timer = 1,

    /// Network events: external inputs from other nodes.
    Network = 2,

    /// Client events: external inputs from users.
    Client = 3,
}

/// All possible events a node can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// The epoch timeout elapsed without progress; advance the epoch.
    EpochTimer,

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// Received a block proposal.
    ///
    /// Sender identity comes from the proposal signature, not transport.
    ProposalReceived { proposal: Proposal },

    /// Received a vote on a block.
    ///
    /// Sender identity comes from vote.voter.
    VoteReceived { vote: Vote },

    /// Received a raw transaction via gossip.
    TransactionReceived { raw: Vec<u8> },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal Events (priority: Internal)
    // ═══════════════════════════════════════════════════════════════════════
    /// A vote set crossed the quorum threshold and a commit certificate was
    /// produced for the block.
    CommitCertificateFormed {
        block_hash: Hash,
        certificate: CommitCertificate,
    },

    /// A block was finalized under the two-chain rule.
    ///
    /// Emitted once per block, in chain order. Subsystems prune against it
    /// (the mempool drops transactions the block carried).
    BlockFinalized { block: Block },

    // ═══════════════════════════════════════════════════════════════════════
    // Client Requests (priority: Client)
    // ═══════════════════════════════════════════════════════════════════════
    /// A client submitted a raw transaction.
    TransactionSubmitted { raw: Vec<u8> },
}

impl Event {
    /// Get the priority for this event type.
    ///
    /// Events at the same timestamp are processed in priority order,
    /// ensuring causality is preserved.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::CommitCertificateFormed { .. } | Event::BlockFinalized { .. } => {
                EventPriority::Internal
            }
            Event::EpochTimer => EventPriority::Timer,
            Event::ProposalReceived { .. }
            | Event::VoteReceived { .. }
            | Event::TransactionReceived { .. } => EventPriority::Network,
            Event::TransactionSubmitted { .. } => EventPriority::Client,
        }
    }

    /// Check if this is an internal event (consequence of prior processing).
    pub fn is_internal(&self) -> bool {
        self.priority() == EventPriority::Internal
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::EpochTimer => "EpochTimer",
            Event::ProposalReceived { .. } => "ProposalReceived",
            Event::VoteReceived { .. } => "VoteReceived",
            Event::TransactionReceived { .. } => "TransactionReceived",
            Event::CommitCertificateFormed { .. } => "CommitCertificateFormed",
            Event::BlockFinalized { .. } => "BlockFinalized",
            Event::TransactionSubmitted { .. } => "TransactionSubmitted",
        }
    }
}
