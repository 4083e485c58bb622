//! Persistence for consensus state.
//!
//! Layout: (a) append-only block records keyed by hash, (b) a small metadata
//! region holding the chain pointers and the last vote epoch, (c) the
//! validator set. None of this is on the critical protocol path; a node that
//! loses its store re-syncs, but one that loses its last-vote epoch could
//! equivocate, which is why vote persistence is write-through.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tessera_consensus::RecoveredState;
use tessera_types::{Block, Hash, ValidatorSet};
use thiserror::Error;
use tracing::warn;

/// Errors from the chain store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("corrupt store: {0}")]
    Corrupt(String),
}

/// Durable consensus state.
pub trait ChainStore: Send {
    fn put_block(&mut self, block: &Block) -> Result<(), StorageError>;
    fn block(&self, hash: &Hash) -> Result<Option<Block>, StorageError>;

    fn set_chain_state(
        &mut self,
        highest_certified: Hash,
        last_finalized: Hash,
    ) -> Result<(), StorageError>;

    /// Must be durable before the vote it guards leaves the node.
    fn set_last_vote_epoch(&mut self, epoch: u64) -> Result<(), StorageError>;

    fn set_validators(&mut self, validators: &ValidatorSet) -> Result<(), StorageError>;
    fn validators(&self) -> Result<Option<ValidatorSet>, StorageError>;

    /// Rebuild the engine's recovery view: the finalized chain in height
    /// order plus the persisted pointers.
    fn recover(&self) -> Result<RecoveredState, StorageError>;
}

/// Everything the store holds, as one serializable value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    blocks: BTreeMap<Hash, Block>,
    highest_certified: Option<Hash>,
    last_finalized: Option<Hash>,
    last_vote_epoch: u64,
    validators: Option<ValidatorSet>,
}

impl StoreData {
    fn recover(&self) -> RecoveredState {
        // Walk the finalized chain backwards from the persisted pointer,
        // then reverse. The walk stops at the first missing parent; genesis
        // itself is reconstructed by the engine and never stored.
        let mut chain = Vec::new();
        let mut cursor = self.last_finalized;
        while let Some(hash) = cursor {
            match self.blocks.get(&hash) {
                Some(block) => {
                    cursor = Some(block.header.parent).filter(|p| !p.is_zero());
                    chain.push(block.clone());
                }
                None => break,
            }
        }
        chain.reverse();

        RecoveredState {
            finalized_blocks: chain,
            highest_certified: self.highest_certified,
            last_finalized: self.last_finalized,
            last_vote_epoch: self.last_vote_epoch,
        }
    }
}

/// Volatile store for tests and throwaway chains.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: StoreData,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryStore {
    fn put_block(&mut self, block: &Block) -> Result<(), StorageError> {
        self.data.blocks.insert(block.hash(), block.clone());
        Ok(())
    }

    fn block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        Ok(self.data.blocks.get(hash).cloned())
    }

    fn set_chain_state(
        &mut self,
        highest_certified: Hash,
        last_finalized: Hash,
    ) -> Result<(), StorageError> {
        self.data.highest_certified = Some(highest_certified);
        self.data.last_finalized = Some(last_finalized);
        Ok(())
    }

    fn set_last_vote_epoch(&mut self, epoch: u64) -> Result<(), StorageError> {
        self.data.last_vote_epoch = epoch;
        Ok(())
    }

    fn set_validators(&mut self, validators: &ValidatorSet) -> Result<(), StorageError> {
        self.data.validators = Some(validators.clone());
        Ok(())
    }

    fn validators(&self) -> Result<Option<ValidatorSet>, StorageError> {
        Ok(self.data.validators.clone())
    }

    fn recover(&self) -> Result<RecoveredState, StorageError> {
        Ok(self.data.recover())
    }
}

/// File-backed store using a single snapshot file.
///
/// Every mutation rewrites the snapshot through a temp file and an atomic
/// rename, so the store is never observable half-written.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: StoreData,
}

impl FileStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StorageError> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = fs::read(&path).map_err(|e| StorageError::Io(e.to_string()))?;
            if bytes.is_empty() {
                StoreData::default()
            } else {
                bincode::deserialize(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?
            }
        } else {
            StoreData::default()
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let bytes =
            bincode::serialize(&self.data).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }
}

impl ChainStore for FileStore {
    fn put_block(&mut self, block: &Block) -> Result<(), StorageError> {
        self.data.blocks.insert(block.hash(), block.clone());
        self.flush()
    }

    fn block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        Ok(self.data.blocks.get(hash).cloned())
    }

    fn set_chain_state(
        &mut self,
        highest_certified: Hash,
        last_finalized: Hash,
    ) -> Result<(), StorageError> {
        self.data.highest_certified = Some(highest_certified);
        self.data.last_finalized = Some(last_finalized);
        self.flush()
    }

    fn set_last_vote_epoch(&mut self, epoch: u64) -> Result<(), StorageError> {
        self.data.last_vote_epoch = epoch;
        self.flush()
    }

    fn set_validators(&mut self, validators: &ValidatorSet) -> Result<(), StorageError> {
        self.data.validators = Some(validators.clone());
        self.flush()
    }

    fn validators(&self) -> Result<Option<ValidatorSet>, StorageError> {
        Ok(self.data.validators.clone())
    }

    fn recover(&self) -> Result<RecoveredState, StorageError> {
        Ok(self.data.recover())
    }
}

impl ChainStore for Box<dyn ChainStore> {
    fn put_block(&mut self, block: &Block) -> Result<(), StorageError> {
        (**self).put_block(block)
    }

    fn block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        (**self).block(hash)
    }

    fn set_chain_state(
        &mut self,
        highest_certified: Hash,
        last_finalized: Hash,
    ) -> Result<(), StorageError> {
        (**self).set_chain_state(highest_certified, last_finalized)
    }

    fn set_last_vote_epoch(&mut self, epoch: u64) -> Result<(), StorageError> {
        (**self).set_last_vote_epoch(epoch)
    }

    fn set_validators(&mut self, validators: &ValidatorSet) -> Result<(), StorageError> {
        (**self).set_validators(validators)
    }

    fn validators(&self) -> Result<Option<ValidatorSet>, StorageError> {
        (**self).validators()
    }

    fn recover(&self) -> Result<RecoveredState, StorageError> {
        (**self).recover()
    }
}

/// Open a file store, falling back to a fresh one if the snapshot is
/// corrupt. A corrupt snapshot is renamed aside for the operator.
pub fn open_or_recover<P: Into<PathBuf>>(path: P) -> Result<FileStore, StorageError> {
    let path = path.into();
    match FileStore::open(path.clone()) {
        Ok(store) => Ok(store),
        Err(StorageError::Corrupt(reason)) => {
            warn!(?path, reason, "Corrupt chain store, starting fresh");
            let aside = path.with_extension("corrupt");
            let _ = fs::rename(&path, aside);
            FileStore::open(path)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{transactions_root, Address, BlockHeader};

    fn make_chain(n: u64) -> Vec<Block> {
        let mut parent = Block::genesis("test");
        let mut chain = Vec::new();
        for height in 1..=n {
            let header = BlockHeader::new(
                "test".to_string(),
                height,
                height,
                parent.hash(),
                transactions_root(&[]),
                Hash::ZERO,
                height,
                Address::new([1u8; 20]),
            );
            let block = Block::new(header, vec![]);
            chain.push(block.clone());
            parent = block;
        }
        chain
    }

    #[test]
    fn test_memory_recover_roundtrip() {
        let chain = make_chain(3);
        let mut store = MemoryStore::new();
        for block in &chain {
            store.put_block(block).unwrap();
        }
        store
            .set_chain_state(chain[2].hash(), chain[2].hash())
            .unwrap();
        store.set_last_vote_epoch(3).unwrap();

        let recovered = store.recover().unwrap();
        assert_eq!(recovered.finalized_blocks.len(), 3);
        assert_eq!(recovered.finalized_blocks[0].height(), 1);
        assert_eq!(recovered.finalized_blocks[2].height(), 3);
        assert_eq!(recovered.last_vote_epoch, 3);
        assert_eq!(recovered.last_finalized, Some(chain[2].hash()));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        let chain = make_chain(2);

        {
            let mut store = FileStore::open(&path).unwrap();
            for block in &chain {
                store.put_block(block).unwrap();
            }
            store
                .set_chain_state(chain[1].hash(), chain[0].hash())
                .unwrap();
            store.set_last_vote_epoch(7).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let recovered = store.recover().unwrap();
        assert_eq!(recovered.last_vote_epoch, 7);
        assert_eq!(recovered.highest_certified, Some(chain[1].hash()));
        // Only the finalized prefix is reported as chain.
        assert_eq!(recovered.finalized_blocks.len(), 1);
        assert_eq!(recovered.finalized_blocks[0].hash(), chain[0].hash());
    }

    #[test]
    fn test_open_or_recover_handles_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        fs::write(&path, b"not a snapshot").unwrap();

        let store = open_or_recover(&path).unwrap();
        assert!(store.recover().unwrap().finalized_blocks.is_empty());
    }
}
