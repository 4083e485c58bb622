//! Node configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tessera_consensus::ConsensusConfig;
use tessera_types::{PublicKey, Validator, ValidatorSet};
use thiserror::Error;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("cannot parse {path}: {reason}")]
    Unparsable { path: PathBuf, reason: String },

    #[error("genesis lists no validators")]
    EmptyValidatorSet,

    #[error("invalid public key {0:?}")]
    InvalidPublicKey(String),
}

/// One validator entry in the genesis file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Hex-encoded ed25519 public key.
    pub public_key: String,
    pub stake: u64,
}

/// The genesis file: chain identity plus the initial validator set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: String,
    pub validators: Vec<GenesisValidator>,
}

impl GenesisConfig {
    pub fn load(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Unparsable {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Build the runtime validator set.
    pub fn validator_set(&self) -> Result<ValidatorSet, ConfigError> {
        if self.validators.is_empty() {
            return Err(ConfigError::EmptyValidatorSet);
        }
        let mut validators = Vec::with_capacity(self.validators.len());
        for entry in &self.validators {
            let bytes = hex::decode(entry.public_key.trim_start_matches("0x"))
                .map_err(|_| ConfigError::InvalidPublicKey(entry.public_key.clone()))?;
            let key: [u8; 32] = bytes
                .try_into()
                .map_err(|_| ConfigError::InvalidPublicKey(entry.public_key.clone()))?;
            validators.push(Validator::new(PublicKey(key), entry.stake));
        }
        Ok(ValidatorSet::new(validators))
    }
}

/// Everything the node process needs to start.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    /// Inbound event queue capacity.
    pub queue_capacity: usize,
    /// Where the RPC listens.
    pub rpc_listen: SocketAddr,
    /// Chain store location; in-memory when absent.
    pub data_dir: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            queue_capacity: crate::runner::DEFAULT_QUEUE_CAPACITY,
            rpc_listen: "127.0.0.1:26657".parse().expect("static address"),
            data_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::KeyPair;

    #[test]
    fn test_genesis_roundtrip() {
        let key = KeyPair::from_seed(&[1u8; 32]);
        let genesis = GenesisConfig {
            chain_id: "devnet".to_string(),
            validators: vec![GenesisValidator {
                public_key: hex::encode(key.public_key().as_bytes()),
                stake: 10,
            }],
        };

        let set = genesis.validator_set().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_stake(), 10);
        assert_eq!(set.by_index(0).unwrap().address, key.address());
    }

    #[test]
    fn test_empty_genesis_rejected() {
        let genesis = GenesisConfig {
            chain_id: "devnet".to_string(),
            validators: vec![],
        };
        assert!(matches!(
            genesis.validator_set(),
            Err(ConfigError::EmptyValidatorSet)
        ));
    }

    #[test]
    fn test_bad_key_rejected() {
        let genesis = GenesisConfig {
            chain_id: "devnet".to_string(),
            validators: vec![GenesisValidator {
                public_key: "zzzz".to_string(),
                stake: 1,
            }],
        };
        assert!(matches!(
            genesis.validator_set(),
            Err(ConfigError::InvalidPublicKey(_))
        ));
    }
}
