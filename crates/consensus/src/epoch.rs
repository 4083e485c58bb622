//! The epoch manager: a local logical clock.

use std::time::Duration;
use tessera_core::{Action, TimerId};

/// Holds the local epoch and drives its advancement.
///
/// The epoch advances when the epoch timer fires without progress, or jumps
/// when a commit certificate with an epoch at or above the local one is
/// observed. Either way the timer is re-armed; stale jumps (target at or
/// below the local epoch) are dropped.
#[derive(Debug)]
pub struct EpochManager {
    epoch: u64,
    timeout: Duration,
}

impl EpochManager {
    pub fn new(epoch: u64, timeout: Duration) -> Self {
        Self { epoch, timeout }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The action that (re-)arms the epoch timer.
    pub fn arm_timer(&self) -> Action {
        Action::SetTimer {
            id: TimerId::Epoch,
            duration: self.timeout,
        }
    }

    /// The timer elapsed: advance by one.
    pub fn on_timeout(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Jump directly to `epoch`. Returns the new epoch, or None if the jump
    /// was stale.
    pub fn jump_to(&mut self, epoch: u64) -> Option<u64> {
        if epoch <= self.epoch {
            return None;
        }
        self.epoch = epoch;
        Some(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_advances_by_one() {
        let mut manager = EpochManager::new(0, Duration::from_secs(6));
        assert_eq!(manager.on_timeout(), 1);
        assert_eq!(manager.on_timeout(), 2);
        assert_eq!(manager.epoch(), 2);
    }

    #[test]
    fn test_jump_forward_only() {
        let mut manager = EpochManager::new(3, Duration::from_secs(6));
        assert_eq!(manager.jump_to(7), Some(7));
        assert_eq!(manager.jump_to(7), None);
        assert_eq!(manager.jump_to(5), None);
        assert_eq!(manager.epoch(), 7);
    }

    #[test]
    fn test_arm_timer_carries_timeout() {
        let manager = EpochManager::new(0, Duration::from_millis(250));
        match manager.arm_timer() {
            Action::SetTimer { id, duration } => {
                assert_eq!(id, TimerId::Epoch);
                assert_eq!(duration, Duration::from_millis(250));
            }
            other => panic!("expected SetTimer, got {:?}", other),
        }
    }
}
