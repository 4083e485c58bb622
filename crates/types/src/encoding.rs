//! Canonical header encoding.
//!
//! Block hashes are keccak-256 over the RLP encoding of the header fields in
//! declared order: (ChainID, Epoch, Height, Parent, TxHash, StateHash,
//! Timestamp, Proposer). Integers encode as minimal big-endian byte strings;
//! empty byte arrays encode as zero-length items, never omitted. Any change
//! to this encoding changes every block hash on the chain.

use crate::block::BlockHeader;
use crate::hash::{keccak256, Address, Hash};
use rlp::{Encodable, RlpStream};

impl Encodable for Hash {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.0.to_vec());
    }
}

impl Encodable for Address {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.0.to_vec());
    }
}

impl Encodable for BlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(8);
        s.append(&self.chain_id.as_bytes().to_vec());
        s.append(&self.epoch);
        s.append(&self.height);
        s.append(&self.parent);
        s.append(&self.tx_hash);
        s.append(&self.state_hash);
        s.append(&self.timestamp);
        s.append(&self.proposer);
    }
}

/// Serialize a header to its canonical byte encoding.
pub fn encode_header(header: &BlockHeader) -> Vec<u8> {
    rlp::encode(header).to_vec()
}

/// Keccak-256 over the RLP list of transaction payloads.
///
/// This is the `TxHash` header field. The empty transaction list is a valid
/// input and yields the digest of the empty RLP list.
pub fn transactions_root(transactions: &[Vec<u8>]) -> Hash {
    let mut s = RlpStream::new_list(transactions.len());
    for tx in transactions {
        s.append(tx);
    }
    keccak256(&s.out())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader::new(
            "test".to_string(),
            1,
            1,
            Hash::ZERO,
            keccak256(b""),
            Hash::ZERO,
            1000,
            Address::new([1u8; 20]),
        )
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let header = sample_header();
        assert_eq!(encode_header(&header), encode_header(&header));
        assert_eq!(header.hash(), sample_header().hash());
        assert_eq!(header.hash().as_bytes().len(), 32);
    }

    #[test]
    fn test_every_field_affects_hash() {
        let base = sample_header();
        let mut variants = Vec::new();
        for i in 0..8 {
            let mut h = sample_header();
            match i {
                0 => h.chain_id = "other".to_string(),
                1 => h.epoch = 2,
                2 => h.height = 2,
                3 => h.parent = keccak256(b"p"),
                4 => h.tx_hash = keccak256(b"t"),
                5 => h.state_hash = keccak256(b"s"),
                6 => h.timestamp = 1001,
                7 => h.proposer = Address::new([2u8; 20]),
                _ => unreachable!(),
            }
            variants.push(h.hash());
        }
        for v in &variants {
            assert_ne!(*v, base.hash());
        }
    }

    #[test]
    fn test_zero_fields_still_encoded() {
        // A header full of zero values must still produce eight RLP items.
        let header = BlockHeader::new(
            String::new(),
            0,
            0,
            Hash::ZERO,
            Hash::ZERO,
            Hash::ZERO,
            0,
            Address::ZERO,
        );
        let encoded = encode_header(&header);
        let decoded = rlp::Rlp::new(&encoded);
        assert_eq!(decoded.item_count().unwrap(), 8);
    }

    #[test]
    fn test_transactions_root_distinguishes_payloads() {
        let empty = transactions_root(&[]);
        let one = transactions_root(&[vec![1, 2, 3]]);
        let two = transactions_root(&[vec![1, 2, 3], vec![4]]);
        assert_ne!(empty, one);
        assert_ne!(one, two);
        // Order matters.
        assert_ne!(
            transactions_root(&[vec![1], vec![2]]),
            transactions_root(&[vec![2], vec![1]])
        );
    }
}
