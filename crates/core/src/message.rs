//! Outbound message types for network communication.

use serde::{Deserialize, Serialize};
use tessera_types::{Proposal, Vote};

/// Wire channel identifiers.
///
/// Consensus publishes on `Proposal` and `Vote`; transaction gossip rides a
/// third channel owned by the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    Proposal,
    Vote,
    Transaction,
}

impl ChannelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Proposal => "proposal",
            ChannelId::Vote => "vote",
            ChannelId::Transaction => "transaction",
        }
    }
}

/// Outbound network messages.
///
/// These are the messages a node can send to other nodes. The runner handles
/// the actual network I/O.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Block proposal announcement.
    Proposal(Proposal),

    /// Vote on a block.
    Vote(Vote),

    /// Raw transaction gossip.
    Transaction(Vec<u8>),
}

impl OutboundMessage {
    /// The channel this message belongs on.
    pub fn channel(&self) -> ChannelId {
        match self {
            OutboundMessage::Proposal(_) => ChannelId::Proposal,
            OutboundMessage::Vote(_) => ChannelId::Vote,
            OutboundMessage::Transaction(_) => ChannelId::Transaction,
        }
    }

    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Proposal(_) => "Proposal",
            OutboundMessage::Vote(_) => "Vote",
            OutboundMessage::Transaction(_) => "Transaction",
        }
    }
}
