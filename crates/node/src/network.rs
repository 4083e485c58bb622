//! The network collaborator boundary.
//!
//! Transport (gossip, peer management, reputation) lives outside this
//! workspace. The engine only needs a fire-and-forget `send`; inbound frames
//! come back through [`crate::runner::InboundHandle::deliver`].

use tessera_core::ChannelId;
use tessera_types::Address;
use tracing::trace;

/// Where an outbound frame goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every peer, best-effort.
    Broadcast,
    /// One validator, best-effort.
    Validator(Address),
}

/// Outbound side of the transport.
///
/// `send` must not block: implementations queue or drop. Delivery is
/// best-effort; consensus tolerates loss and reordering.
pub trait Network: Send + Sync {
    fn send(&self, recipient: Recipient, channel: ChannelId, bytes: Vec<u8>);
}

/// A transport that drops everything.
///
/// Used for single-validator development chains, where the node's own vote
/// is the whole quorum, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNetwork;

impl Network for NullNetwork {
    fn send(&self, recipient: Recipient, channel: ChannelId, bytes: Vec<u8>) {
        trace!(
            ?recipient,
            channel = channel.as_str(),
            len = bytes.len(),
            "Dropping outbound frame (null network)"
        );
    }
}
