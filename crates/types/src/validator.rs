//! Validator identities and stake-weighted quorum arithmetic.

use crate::crypto::PublicKey;
use crate::hash::Address;
use serde::{Deserialize, Serialize};

/// One validator: its identity and its stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub public_key: PublicKey,
    pub stake: u64,
}

impl Validator {
    pub fn new(public_key: PublicKey, stake: u64) -> Self {
        Self {
            address: public_key.address(),
            public_key,
            stake,
        }
    }
}

/// Ordered set of validators, stable within an epoch.
///
/// Ordering is significant: the leader schedule walks the set in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    total_stake: u64,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>) -> Self {
        let total_stake = validators.iter().map(|v| v.stake).sum();
        Self {
            validators,
            total_stake,
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn total_stake(&self) -> u64 {
        self.total_stake
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    pub fn get(&self, address: &Address) -> Option<&Validator> {
        self.validators.iter().find(|v| v.address == *address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    pub fn by_index(&self, index: usize) -> Option<&Validator> {
        self.validators.get(index)
    }

    /// Stake held by `address`, zero for non-members.
    pub fn stake_of(&self, address: &Address) -> u64 {
        self.get(address).map(|v| v.stake).unwrap_or(0)
    }

    /// Quorum test: `stake` strictly exceeds two thirds of total stake.
    ///
    /// Computed as 3·stake > 2·total to avoid integer division.
    pub fn has_quorum(&self, stake: u64) -> bool {
        3 * (stake as u128) > 2 * (self.total_stake as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn make_set(stakes: &[u64]) -> ValidatorSet {
        let validators = stakes
            .iter()
            .enumerate()
            .map(|(i, &stake)| {
                let key = KeyPair::from_seed(&[i as u8 + 1; 32]);
                Validator::new(key.public_key(), stake)
            })
            .collect();
        ValidatorSet::new(validators)
    }

    #[test]
    fn test_total_stake() {
        let set = make_set(&[1, 2, 3, 4]);
        assert_eq!(set.total_stake(), 10);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_quorum_strictly_exceeds_two_thirds() {
        // Total stake 3: quorum needs > 2, i.e. 3.
        let set = make_set(&[1, 1, 1]);
        assert!(!set.has_quorum(2));
        assert!(set.has_quorum(3));

        // Total stake 4: quorum needs > 8/3, i.e. 3.
        let set = make_set(&[1, 1, 1, 1]);
        assert!(!set.has_quorum(2));
        assert!(set.has_quorum(3));

        // Exact two-thirds is not a quorum.
        let set = make_set(&[2, 2, 2]);
        assert!(!set.has_quorum(4));
        assert!(set.has_quorum(5));
    }

    #[test]
    fn test_membership_lookup() {
        let set = make_set(&[5, 5]);
        let member = set.by_index(0).unwrap().address;
        assert!(set.contains(&member));
        assert_eq!(set.stake_of(&member), 5);

        let outsider = KeyPair::from_seed(&[99u8; 32]).address();
        assert!(!set.contains(&outsider));
        assert_eq!(set.stake_of(&outsider), 0);
    }
}
