//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! ```text
//! [version: u8][payload]
//! ```
//!
//! - Version is currently `1`
//! - Proposal and vote payloads are bincode-encoded structs
//! - Transaction payloads are the raw transaction bytes
//!
//! Message type is determined by the channel the frame arrived on, not by a
//! field in the message; the transport is expected to length-prefix frames.
//! Deserialization failures are logged by the caller and the frame dropped -
//! the protocol has no negative acknowledgments.

use tessera_core::{ChannelId, Event, OutboundMessage};
use tessera_types::{Proposal, Vote};
use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("message too short")]
    MessageTooShort,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),
}

/// Encode an outbound message to wire format.
pub fn encode_message(message: &OutboundMessage) -> Result<Vec<u8>, CodecError> {
    let payload = match message {
        OutboundMessage::Proposal(proposal) => {
            bincode::serialize(proposal).map_err(|e| CodecError::Encode(e.to_string()))?
        }
        OutboundMessage::Vote(vote) => {
            bincode::serialize(vote).map_err(|e| CodecError::Encode(e.to_string()))?
        }
        OutboundMessage::Transaction(raw) => raw.clone(),
    };

    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend(payload);
    Ok(bytes)
}

/// Decode a frame from wire format based on the channel it arrived on.
pub fn decode_message(channel: ChannelId, data: &[u8]) -> Result<Event, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }
    let version = data[0];
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    let payload = &data[1..];

    match channel {
        ChannelId::Proposal => {
            let proposal: Proposal =
                bincode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))?;
            Ok(Event::ProposalReceived { proposal })
        }
        ChannelId::Vote => {
            let vote: Vote =
                bincode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))?;
            Ok(Event::VoteReceived { vote })
        }
        ChannelId::Transaction => Ok(Event::TransactionReceived {
            raw: payload.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{transactions_root, Address, Block, BlockHeader, Hash, KeyPair};

    fn make_proposal() -> Proposal {
        let key = KeyPair::from_seed(&[1u8; 32]);
        let header = BlockHeader::new(
            "test".to_string(),
            1,
            1,
            Hash::ZERO,
            transactions_root(&[]),
            Hash::ZERO,
            1000,
            key.address(),
        );
        Proposal::new(Block::new(header, vec![]), None, &key)
    }

    #[test]
    fn test_encode_decode_proposal() {
        let proposal = make_proposal();
        let bytes = encode_message(&OutboundMessage::Proposal(proposal.clone())).unwrap();
        assert_eq!(bytes[0], WIRE_VERSION);

        match decode_message(ChannelId::Proposal, &bytes).unwrap() {
            Event::ProposalReceived { proposal: decoded } => {
                assert_eq!(decoded.block.hash(), proposal.block.hash());
                assert_eq!(decoded.signature, proposal.signature);
            }
            other => panic!("expected ProposalReceived, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_decode_vote() {
        let key = KeyPair::from_seed(&[2u8; 32]);
        let vote = Vote::new("test", Hash::new([7u8; 32]), 3, &key);
        let bytes = encode_message(&OutboundMessage::Vote(vote.clone())).unwrap();

        match decode_message(ChannelId::Vote, &bytes).unwrap() {
            Event::VoteReceived { vote: decoded } => assert_eq!(decoded, vote),
            other => panic!("expected VoteReceived, got {:?}", other),
        }
    }

    #[test]
    fn test_transaction_passthrough() {
        let raw = vec![0xde, 0xad, 0xbe, 0xef];
        let bytes = encode_message(&OutboundMessage::Transaction(raw.clone())).unwrap();
        match decode_message(ChannelId::Transaction, &bytes).unwrap() {
            Event::TransactionReceived { raw: decoded } => assert_eq!(decoded, raw),
            other => panic!("expected TransactionReceived, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_version() {
        let result = decode_message(ChannelId::Vote, &[99, 1, 2, 3]);
        assert!(matches!(result, Err(CodecError::UnknownVersion(99))));
    }

    #[test]
    fn test_wrong_channel_fails() {
        let proposal = make_proposal();
        let bytes = encode_message(&OutboundMessage::Proposal(proposal)).unwrap();
        // A proposal frame arriving on the vote channel does not parse.
        assert!(matches!(
            decode_message(ChannelId::Vote, &bytes),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_frame() {
        assert!(matches!(
            decode_message(ChannelId::Vote, &[]),
            Err(CodecError::MessageTooShort)
        ));
    }
}
