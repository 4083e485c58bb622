//! Leader election.

use tessera_types::{Validator, ValidatorSet};

/// Deterministic leader election for each epoch.
///
/// Implementations must be deterministic given the epoch and validator set,
/// and proportional to stake in the limit. Swapping strategies is allowed
/// only between epochs.
pub trait LeaderSchedule: Send + Sync {
    /// The designated leader of `epoch`.
    fn leader<'a>(&self, validators: &'a ValidatorSet, epoch: u64) -> &'a Validator;
}

/// Stake-weighted round robin.
///
/// The validator list is laid out on a virtual ring of length equal to total
/// stake, each validator occupying `stake` contiguous slots in set order;
/// the leader of epoch `e` occupies slot `e mod total_stake`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinStakeSchedule;

impl LeaderSchedule for RoundRobinStakeSchedule {
    fn leader<'a>(&self, validators: &'a ValidatorSet, epoch: u64) -> &'a Validator {
        assert!(
            validators.total_stake() > 0,
            "leader election over an empty validator set"
        );
        let slot = epoch % validators.total_stake();

        let mut cursor = 0u64;
        for validator in validators.iter() {
            cursor += validator.stake;
            if slot < cursor {
                return validator;
            }
        }
        unreachable!("slot {} is within total stake {}", slot, validators.total_stake())
    }
}
