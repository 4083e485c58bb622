//! Transaction mempool.
//!
//! Holds opaque transaction payloads between submission and finalization.
//! Validity filtering of payload contents is the submitter's problem; the
//! pool only deduplicates by hash, bounds its size, and hands ordered
//! batches to the proposer.

mod state;

pub use state::{MempoolConfig, MempoolState};
