//! Action types for the deterministic state machine.

use crate::{ChannelId, Event, OutboundMessage, TimerId};
use tessera_types::{Address, Block, Hash};
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Broadcast a message to all peers on a channel (best-effort).
    Broadcast {
        channel: ChannelId,
        message: OutboundMessage,
    },

    /// Send a message to one validator (best-effort unicast).
    SendToValidator {
        validator: Address,
        channel: ChannelId,
        message: OutboundMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration, replacing any timer with the
    /// same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal (fed back as events with Internal priority)
    // ═══════════════════════════════════════════════════════════════════════
    /// Enqueue an internal event for immediate processing.
    ///
    /// Internal events are processed at the same timestamp with higher
    /// priority than external events, preserving causality.
    EnqueueInternal { event: Event },

    // ═══════════════════════════════════════════════════════════════════════
    // External Notifications
    // ═══════════════════════════════════════════════════════════════════════
    /// Publish a finalized block on the outbound stream.
    ///
    /// The stream is advisory: if the consumer is not ready the block is
    /// dropped, and consumers catch up through the tree.
    EmitFinalizedBlock { block: Block },

    // ═══════════════════════════════════════════════════════════════════════
    // Storage
    // ═══════════════════════════════════════════════════════════════════════
    /// Persist a finalized block, keyed by hash.
    PersistBlock { block: Block },

    /// Persist the epoch we are about to vote in, BEFORE the vote is
    /// broadcast. After a crash we must remember the highest epoch voted so
    /// we never double-vote within it.
    PersistOwnVote { epoch: u64 },

    /// Persist the distinguished chain pointers.
    PersistChainState {
        highest_certified: Hash,
        last_finalized: Hash,
    },
}

impl Action {
    /// Check if this is a storage write action.
    pub fn is_storage_write(&self) -> bool {
        matches!(
            self,
            Action::PersistBlock { .. }
                | Action::PersistOwnVote { .. }
                | Action::PersistChainState { .. }
        )
    }

    /// Check if this is an internal event action.
    pub fn is_internal(&self) -> bool {
        matches!(self, Action::EnqueueInternal { .. })
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendToValidator { .. } => "SendToValidator",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
            Action::EmitFinalizedBlock { .. } => "EmitFinalizedBlock",
            Action::PersistBlock { .. } => "PersistBlock",
            Action::PersistOwnVote { .. } => "PersistOwnVote",
            Action::PersistChainState { .. } => "PersistChainState",
        }
    }
}
