//! Consensus configuration.

use std::time::Duration;

/// Tunables for the consensus engine.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Wall-clock duration of an epoch without progress before the local
    /// clock advances.
    pub epoch_timeout: Duration,

    /// Maximum transactions included in one proposal.
    pub max_transactions_per_block: usize,

    /// Proposals buffered while their parent is unknown. Oldest entries are
    /// evicted once full.
    pub orphan_pool_capacity: usize,

    /// Proposals and votes more than this many epochs behind the local epoch
    /// are dropped silently.
    pub stale_epoch_lag: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            epoch_timeout: Duration::from_secs(6),
            max_transactions_per_block: tessera_types::MAX_TRANSACTIONS_PER_BLOCK,
            orphan_pool_capacity: 64,
            stale_epoch_lag: 8,
        }
    }
}
