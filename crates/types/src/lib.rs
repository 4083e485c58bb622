//! Core types for Tessera consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, Address, cryptographic keys and signatures
//! - **Consensus types**: Block, BlockHeader, Vote, VoteSet, CommitCertificate
//! - **Validators**: ValidatorSet with stake-weighted quorum arithmetic
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod block;
mod crypto;
mod encoding;
mod hash;
mod proposal;
mod validator;
mod vote;

pub use block::{Block, BlockHeader, BlockStatus, ExtendedBlock, MAX_TRANSACTIONS_PER_BLOCK};
pub use crypto::{proposal_message, vote_message, CryptoError, KeyPair, PublicKey, Signature};
pub use encoding::transactions_root;
pub use hash::{keccak256, Address, Hash};
pub use proposal::Proposal;
pub use validator::{Validator, ValidatorSet};
pub use vote::{CertificateError, CommitCertificate, Vote, VoteSet};
