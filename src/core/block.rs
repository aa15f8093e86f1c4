//! # Block
//!
//! A mined, immutable record in the chain. The hash commits to every other
//! field (it is computed over the block with `hash` cleared), and proof of
//! work requires it to start with `difficulty` leading `'0'` hex characters.

use crate::core::transaction::Tx;
use crate::error::Result;
use crate::util::{current_timestamp, hash_value};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    hash: String,
    /// Hash of the previous block; empty for genesis.
    prev_hash: String,
    height: u64,
    difficulty: u64,
    nonce: u64,
    /// Unix seconds, refreshed on every mining iteration.
    timestamp: i64,
    /// Ordered; the first element is always the coinbase.
    transactions: Vec<Tx>,
}

impl Block {
    ///
    /// The `mine` function searches for a nonce whose hash satisfies the
    /// difficulty. The timestamp is refreshed each iteration so a saturated
    /// CPU still records a plausible completion time. Everything but `nonce`
    /// and `timestamp` is fixed before the search starts, including the
    /// transaction list.
    ///
    pub fn mine(
        prev_hash: String,
        height: u64,
        difficulty: u64,
        transactions: Vec<Tx>,
    ) -> Result<Block> {
        let mut block = Block {
            hash: String::new(),
            prev_hash,
            height,
            difficulty,
            nonce: 0,
            timestamp: 0,
            transactions,
        };
        loop {
            block.timestamp = current_timestamp();
            let candidate = block.compute_hash()?;
            if has_required_prefix(candidate.as_str(), block.difficulty) {
                block.hash = candidate;
                return Ok(block);
            }
            block.nonce += 1;
        }
    }

    /// Hash of the block with its `hash` field cleared.
    pub fn compute_hash(&self) -> Result<String> {
        let mut copy = self.clone();
        copy.hash = String::new();
        hash_value(&copy)
    }

    /// Checks the recorded proof of work: the stored hash carries the
    /// required zero prefix and matches a recomputation.
    pub fn is_valid_proof(&self) -> Result<bool> {
        Ok(has_required_prefix(self.hash.as_str(), self.difficulty)
            && self.compute_hash()? == self.hash)
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_prev_hash(&self) -> &str {
        self.prev_hash.as_str()
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_difficulty(&self) -> u64 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Tx] {
        self.transactions.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        crate::util::encode_to_bytes(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        crate::util::decode_from_bytes(bytes)
    }

    /// Test-only constructor for fabricating blocks with chosen fields.
    #[cfg(test)]
    pub(crate) fn fabricate(
        hash: &str,
        prev_hash: &str,
        height: u64,
        difficulty: u64,
        timestamp: i64,
        transactions: Vec<Tx>,
    ) -> Block {
        Block {
            hash: hash.to_string(),
            prev_hash: prev_hash.to_string(),
            height,
            difficulty,
            nonce: 0,
            timestamp,
            transactions,
        }
    }
}

fn has_required_prefix(hash: &str, difficulty: u64) -> bool {
    let prefix_len = difficulty as usize;
    hash.len() >= prefix_len && hash.as_bytes()[..prefix_len].iter().all(|b| *b == b'0')
}
