use crate::error::{NodeError, Result};
use sled::{Db, Tree};
use std::path::Path;

const CHECKPOINTS_TREE: &str = "checkpoints";
const BLOCKS_TREE: &str = "blocks";
const CHECKPOINT_KEY: &str = "checkpoint";

/// The two-bucket blob store backing a node: `checkpoints` holds the single
/// chain-head record under the `checkpoint` key, `blocks` maps hex block
/// hashes to encoded blocks.
#[derive(Clone, Debug)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn open(path: &Path) -> Result<Store> {
        let db = sled::open(path).map_err(|e| NodeError::Storage(e.to_string()))?;
        Ok(Store { db })
    }

    fn blocks(&self) -> Result<Tree> {
        self.db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| NodeError::Storage(e.to_string()))
    }

    fn checkpoints(&self) -> Result<Tree> {
        self.db
            .open_tree(CHECKPOINTS_TREE)
            .map_err(|e| NodeError::Storage(e.to_string()))
    }

    pub fn save_block(&self, hash: &str, bytes: Vec<u8>) -> Result<()> {
        self.blocks()?
            .insert(hash, bytes)
            .map(|_| ())
            .map_err(|e| NodeError::Storage(e.to_string()))
    }

    pub fn get_block(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let bytes = self
            .blocks()?
            .get(hash)
            .map_err(|e| NodeError::Storage(e.to_string()))?;
        Ok(bytes.map(|ivec| ivec.to_vec()))
    }

    pub fn save_checkpoint(&self, bytes: Vec<u8>) -> Result<()> {
        // The key never changes; every head update replaces the previous blob.
        self.checkpoints()?
            .insert(CHECKPOINT_KEY, bytes)
            .map(|_| ())
            .map_err(|e| NodeError::Storage(e.to_string()))
    }

    pub fn get_checkpoint(&self) -> Result<Option<Vec<u8>>> {
        let bytes = self
            .checkpoints()?
            .get(CHECKPOINT_KEY)
            .map_err(|e| NodeError::Storage(e.to_string()))?;
        Ok(bytes.map(|ivec| ivec.to_vec()))
    }

    /// Drops and recreates the blocks bucket. Used when a whole chain is
    /// replaced by a longer one from a peer.
    pub fn empty_blocks(&self) -> Result<()> {
        self.db
            .drop_tree(BLOCKS_TREE)
            .map_err(|e| NodeError::Storage(e.to_string()))?;
        self.blocks().map(|_| ())
    }
}
