//! Deterministic simulation of a Tessera validator network.
//!
//! Runs any number of node state machines against a simulated clock and
//! network. Events are processed in a single thread in deterministic order;
//! given the same seed, a simulation produces identical results every run.
//! Latency, jitter, packet loss, and partitions are all configurable.

mod event_queue;
mod network;
mod runner;

pub use event_queue::EventKey;
pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{NodeIndex, SimStorage, SimulationRunner, SimulationStats};
