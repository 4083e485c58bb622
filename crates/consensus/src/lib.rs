//! Tessera consensus engine.
//!
//! This crate provides a synchronous, event-driven implementation of the
//! leader-based chained-voting consensus protocol.
//!
//! # Architecture
//!
//! The engine processes events synchronously:
//!
//! - `Event::EpochTimer` → Advance the epoch; build and broadcast a proposal
//!   if we are the new epoch's leader
//! - `Event::ProposalReceived` → Validate, insert into the block tree, vote
//! - `Event::VoteReceived` → Aggregate votes, form a commit certificate when
//!   quorum is reached
//! - `Event::CommitCertificateFormed` → Update chain pointers, finalize under
//!   the two-chain rule, advance the epoch
//!
//! All I/O is performed by the runner via returned `Action`s.
//!
//! # Terminology
//!
//! - **Epoch**: A logical time interval with a single designated leader.
//!   Advances on timeout or on observing a commit certificate with an epoch
//!   at or above the local one.
//!
//! - **Commit certificate (CC)**: A vote set attached to a block whose
//!   stake-weighted voters strictly exceed ⅔ of total stake. A block with a
//!   CC is Committed.
//!
//! - **Finalization (two-chain)**: A block is irrevocable once it has a CC
//!   and one of its direct children also has a CC.
//!
//! - **Tip**: The block the next proposal extends: the deepest descendant of
//!   the highest-CC block, tie-broken by epoch then hash.
//!
//! # Safety
//!
//! - **Vote locking**: A validator votes at most once per epoch. Within an
//!   epoch it only votes for blocks extending the highest-CC block, so no
//!   two conflicting blocks can both gather a quorum from honest stake.
//!
//! - **Quorum intersection**: Any two quorums of > ⅔ stake intersect in
//!   > ⅓ stake, more than the byzantine bound, so conflicting commit
//!   certificates at one height are impossible.
//!
//! # Liveness
//!
//! Under eventual synchrony, honest leaders in successive epochs extend the
//! tip; votes reach the next leader before its epoch timer elapses, yielding
//! commit certificates that advance the highest-CC block and thus the tip.

mod config;
mod engine;
mod epoch;
mod orphan;
mod proposer;
mod replica;
mod schedule;
mod tree;
mod vote_store;

pub use config::ConsensusConfig;
pub use engine::{ChainSnapshot, EngineCore, EngineState, RecoveredState};
pub use epoch::EpochManager;
pub use orphan::OrphanPool;
pub use proposer::{DefaultProposerStrategy, ProposerStrategy};
pub use replica::{DefaultReplicaStrategy, ReplicaStrategy};
pub use schedule::{LeaderSchedule, RoundRobinStakeSchedule};
pub use tree::{BlockTree, BlockTreeError};
pub use vote_store::{AddResult, EquivocationEvidence, VoteError, VoteStore};
