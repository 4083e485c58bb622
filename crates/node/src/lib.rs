//! The Tessera node.
//!
//! Composes the consensus engine and the mempool into a single
//! [`NodeStateMachine`], and provides the production plumbing around it:
//! the tokio event-loop runner, timers, the wire codec, persistence, the
//! RPC surface, and metrics.

pub mod codec;
pub mod config;
pub mod metrics;
pub mod network;
pub mod rpc;
pub mod runner;
pub mod state;
pub mod storage;

pub use config::{ConfigError, GenesisConfig, GenesisValidator, NodeConfig};
pub use network::{Network, NullNetwork, Recipient};
pub use runner::{InboundHandle, NodeHandle, NodeRunner};
pub use state::NodeStateMachine;
pub use storage::{ChainStore, FileStore, MemoryStore, StorageError};
