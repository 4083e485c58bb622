//! Key material and signing.
//!
//! Proposals and votes are signed with ed25519. Signing messages carry a
//! domain tag and the chain identifier so a signature produced for one
//! message kind or chain can never be replayed as another.

use crate::hash::{keccak256, Address, Hash};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Domain tag for vote signatures.
const DOMAIN_VOTE: &[u8] = b"vote:";
/// Domain tag for proposal signatures.
const DOMAIN_PROPOSAL: &[u8] = b"proposal:";

/// Errors from signature checks.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("malformed public key")]
    InvalidPublicKey,

    #[error("signature verification failed")]
    InvalidSignature,
}

/// An ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The 20-byte address of this key: trailing bytes of keccak-256(key).
    pub fn address(&self) -> Address {
        let digest = keccak256(&self.0);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[12..]);
        Address(bytes)
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(0x{})", &hex::encode(&self.0[..4]))
    }
}

/// An ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", &hex::encode(&self.0[..4]))
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))?;
        Ok(Signature(array))
    }
}

/// Signing key pair for a validator.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut rng),
        }
    }

    /// Derive a key pair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign `message`, returning a detached signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Construct the signing message for a vote on `block_hash` at `epoch`.
pub fn vote_message(chain_id: &str, block_hash: &Hash, epoch: u64) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_VOTE.len() + chain_id.len() + 40);
    message.extend_from_slice(DOMAIN_VOTE);
    message.extend_from_slice(chain_id.as_bytes());
    message.extend_from_slice(block_hash.as_bytes());
    message.extend_from_slice(&epoch.to_be_bytes());
    message
}

/// Construct the signing message for a proposal of the block with `block_hash`.
pub fn proposal_message(chain_id: &str, block_hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_PROPOSAL.len() + chain_id.len() + 32);
    message.extend_from_slice(DOMAIN_PROPOSAL);
    message.extend_from_slice(chain_id.as_bytes());
    message.extend_from_slice(block_hash.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = KeyPair::from_seed(&[1u8; 32]);
        let message = vote_message("test", &Hash::ZERO, 7);
        let signature = key.sign(&message);
        key.public_key().verify(&message, &signature).unwrap();
    }

    #[test]
    fn test_wrong_message_rejected() {
        let key = KeyPair::from_seed(&[2u8; 32]);
        let signature = key.sign(b"hello");
        assert!(matches!(
            key.public_key().verify(b"goodbye", &signature),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = KeyPair::from_seed(&[3u8; 32]);
        let other = KeyPair::from_seed(&[4u8; 32]);
        let signature = key.sign(b"payload");
        assert!(other.public_key().verify(b"payload", &signature).is_err());
    }

    #[test]
    fn test_deterministic_from_seed() {
        let a = KeyPair::from_seed(&[9u8; 32]);
        let b = KeyPair::from_seed(&[9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_domain_separation() {
        // A vote message and a proposal message over the same hash differ.
        let hash = keccak256(b"block");
        assert_ne!(vote_message("test", &hash, 0), proposal_message("test", &hash));
    }

    #[test]
    fn test_signature_serde_roundtrip() {
        let key = KeyPair::from_seed(&[5u8; 32]);
        let signature = key.sign(b"frame");
        let bytes = bincode::serialize(&signature).unwrap();
        let decoded: Signature = bincode::deserialize(&bytes).unwrap();
        assert_eq!(signature, decoded);
    }
}
