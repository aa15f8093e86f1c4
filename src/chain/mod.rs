//! Chain state management: the persisted head (newest hash, height, current
//! difficulty), block persistence, newest-first traversal, and the adaptive
//! difficulty schedule.

pub mod utxo;

use crate::core::block::Block;
use crate::core::mempool::Mempool;
use crate::error::{NodeError, Result};
use crate::store::Store;
use crate::util::{decode_from_bytes, encode_to_bytes, expect_persisted};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

pub const DEFAULT_DIFFICULTY: u64 = 2;
/// Difficulty is recalculated every this many blocks.
pub const DIFFICULTY_EPOCH: u64 = 5;
pub const EXPECTED_MINUTES_PER_BLOCK: i64 = 2;
/// Allowed deviation, in minutes, around the expected epoch duration.
pub const ALLOWED_RANGE_MINUTES: i64 = 2;

/// The chain head, persisted as the single checkpoint blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    newest_hash: String,
    height: u64,
    current_difficulty: u64,
}

impl ChainState {
    pub fn get_newest_hash(&self) -> &str {
        self.newest_hash.as_str()
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_current_difficulty(&self) -> u64 {
        self.current_difficulty
    }
}

/// The blockchain service. One instance per process, constructed in `main`
/// and shared by reference; the head lock serializes every mutation and
/// every consistent read of the chain.
#[derive(Debug)]
pub struct Chain {
    state: Mutex<ChainState>,
    store: Store,
}

impl Chain {
    /// Restores the head from the persisted checkpoint, or mines the genesis
    /// block when the store is fresh.
    pub async fn initialize(store: Store, miner_address: &str, mempool: &Mempool) -> Result<Chain> {
        let chain = Chain {
            state: Mutex::new(ChainState::default()),
            store,
        };
        match expect_persisted(chain.store.get_checkpoint()) {
            Some(bytes) => {
                let restored: ChainState = expect_persisted(decode_from_bytes(bytes.as_slice()));
                info!(height = restored.height, "restored chain head from checkpoint");
                *chain.state.lock().await = restored;
            }
            None => {
                let genesis = chain.add_block(miner_address, mempool).await?;
                info!(hash = genesis.get_hash(), "mined genesis block");
            }
        }
        Ok(chain)
    }

    ///
    /// The `add_block` function mines and appends the next block. Under the
    /// head lock: compute the difficulty, drain the mempool (coinbase first),
    /// run the nonce search, persist the block, then update and persist the
    /// head. The caller is responsible for broadcasting the returned block.
    ///
    pub async fn add_block(&self, miner_address: &str, mempool: &Mempool) -> Result<Block> {
        let mut state = self.state.lock().await;
        let difficulty = self.next_difficulty(&state)?;
        // Head lock is held; the mempool lock nests inside it (chain → mempool).
        let transactions = mempool.txs_to_confirm(miner_address)?;
        let block = Block::mine(
            state.newest_hash.clone(),
            state.height + 1,
            difficulty,
            transactions,
        )?;
        let bytes = expect_persisted(block.serialize());
        expect_persisted(self.store.save_block(block.get_hash(), bytes));
        state.newest_hash = block.get_hash().to_string();
        state.height = block.get_height();
        state.current_difficulty = block.get_difficulty();
        expect_persisted(self.store.save_checkpoint(expect_persisted(encode_to_bytes(&*state))));
        Ok(block)
    }

    ///
    /// The `add_peer_block` function applies a block mined by a peer: the
    /// head takes over the block's difficulty, height and hash, both are
    /// persisted, and any pending transaction confirmed by the block is
    /// dropped from the mempool. Locks are acquired head-then-mempool and
    /// released in reverse.
    ///
    /// With `validate` set, the block must carry a correct proof of work and
    /// extend the current head; without it, anything structurally sound is
    /// accepted, as the earliest nodes did.
    ///
    pub async fn add_peer_block(
        &self,
        block: Block,
        mempool: &Mempool,
        validate: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if validate
            && (!block.is_valid_proof()?
                || block.get_prev_hash() != state.newest_hash
                || block.get_height() != state.height + 1)
        {
            return Err(NodeError::InvalidBlock);
        }
        state.current_difficulty = block.get_difficulty();
        state.height += 1;
        state.newest_hash = block.get_hash().to_string();
        expect_persisted(self.store.save_checkpoint(expect_persisted(encode_to_bytes(&*state))));
        let bytes = expect_persisted(block.serialize());
        expect_persisted(self.store.save_block(block.get_hash(), bytes));
        mempool.remove_confirmed(block.get_transactions())?;
        Ok(())
    }

    ///
    /// The `replace` function swaps the whole local chain for one received
    /// from a peer, newest-first. The blocks bucket is emptied and rebuilt;
    /// there is no reorg of individual blocks.
    ///
    pub async fn replace(&self, new_chain: Vec<Block>, validate: bool) -> Result<()> {
        if new_chain.is_empty() {
            return Err(NodeError::InvalidBlock);
        }
        if validate {
            verify_chain(new_chain.as_slice())?;
        }
        let mut state = self.state.lock().await;
        state.current_difficulty = new_chain[0].get_difficulty();
        state.height = new_chain.len() as u64;
        state.newest_hash = new_chain[0].get_hash().to_string();
        expect_persisted(self.store.empty_blocks());
        expect_persisted(self.store.save_checkpoint(expect_persisted(encode_to_bytes(&*state))));
        for block in &new_chain {
            let bytes = expect_persisted(block.serialize());
            expect_persisted(self.store.save_block(block.get_hash(), bytes));
        }
        Ok(())
    }

    /// Every block, newest first, by following the prev-hash links from the
    /// head. Runs under the head lock for a consistent view.
    pub async fn all_blocks(&self) -> Result<Vec<Block>> {
        let state = self.state.lock().await;
        self.blocks_from(state.newest_hash.as_str())
    }

    /// Loads a single block from the store. An absent hash is a domain
    /// outcome; an unreadable or undecodable block is corruption and aborts.
    pub fn find_block(&self, hash: &str) -> Result<Block> {
        let bytes = expect_persisted(self.store.get_block(hash)).ok_or(NodeError::BlockNotFound)?;
        Ok(expect_persisted(Block::deserialize(bytes.as_slice())))
    }

    /// The block at the head of the chain.
    pub async fn newest_block(&self) -> Result<Block> {
        let state = self.state.lock().await;
        self.find_block(state.newest_hash.as_str())
    }

    pub async fn status(&self) -> ChainState {
        self.state.lock().await.clone()
    }

    fn blocks_from(&self, newest_hash: &str) -> Result<Vec<Block>> {
        let mut blocks = vec![];
        let mut cursor = newest_hash.to_string();
        while !cursor.is_empty() {
            let block = self.find_block(cursor.as_str())?;
            cursor = block.get_prev_hash().to_string();
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Difficulty for the next block: the default on an empty chain, a
    /// recalculation at every epoch boundary, the current value otherwise.
    fn next_difficulty(&self, state: &ChainState) -> Result<u64> {
        if state.height == 0 {
            Ok(DEFAULT_DIFFICULTY)
        } else if state.height % DIFFICULTY_EPOCH == 0 {
            let blocks = self.blocks_from(state.newest_hash.as_str())?;
            match (blocks.first(), blocks.get(DIFFICULTY_EPOCH as usize - 1)) {
                (Some(newest), Some(anchor)) => Ok(recalculated_difficulty(
                    state.current_difficulty,
                    newest.get_timestamp(),
                    anchor.get_timestamp(),
                )),
                _ => Ok(state.current_difficulty),
            }
        } else {
            Ok(state.current_difficulty)
        }
    }
}

///
/// The `recalculated_difficulty` function compares how long the last epoch
/// actually took against the expected duration and moves the difficulty one
/// step, within the tolerance band. The result never drops below 1.
///
/// # Arguments
///
/// * `current` - the difficulty in force.
/// * `newest_timestamp` - timestamp of the newest block, unix seconds.
/// * `anchor_timestamp` - timestamp of the block that opened the epoch.
///
pub fn recalculated_difficulty(current: u64, newest_timestamp: i64, anchor_timestamp: i64) -> u64 {
    let actual_minutes = (newest_timestamp - anchor_timestamp) / 60;
    let expected_minutes = DIFFICULTY_EPOCH as i64 * EXPECTED_MINUTES_PER_BLOCK;
    if actual_minutes <= expected_minutes - ALLOWED_RANGE_MINUTES {
        current + 1
    } else if actual_minutes >= expected_minutes + ALLOWED_RANGE_MINUTES {
        current.saturating_sub(1).max(1)
    } else {
        current
    }
}

/// Structural verification of a received chain: every proof of work holds,
/// consecutive blocks link by hash and height, and the oldest entry is a
/// genesis block.
fn verify_chain(blocks: &[Block]) -> Result<()> {
    for pair in blocks.windows(2) {
        if pair[0].get_prev_hash() != pair[1].get_hash()
            || pair[0].get_height() != pair[1].get_height() + 1
        {
            return Err(NodeError::InvalidBlock);
        }
    }
    for block in blocks {
        if !block.is_valid_proof()? {
            return Err(NodeError::InvalidBlock);
        }
    }
    match blocks.last() {
        Some(genesis) if genesis.get_prev_hash().is_empty() && genesis.get_height() == 1 => Ok(()),
        _ => Err(NodeError::InvalidBlock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_chain_parts() -> (Store, Mempool, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = Store::open(&dir.path().join("db")).expect("Failed to open store");
        (store, Mempool::new(), dir)
    }

    async fn scratch_chain() -> (Chain, Mempool, tempfile::TempDir) {
        let (store, mempool, dir) = scratch_chain_parts();
        let chain = Chain::initialize(store, "miner-address", &mempool)
            .await
            .expect("Failed to initialize chain");
        (chain, mempool, dir)
    }

    #[tokio::test]
    async fn test_initialize_mines_genesis() {
        let (chain, mempool, _dir) = scratch_chain().await;
        let status = chain.status().await;

        assert_eq!(status.get_height(), 1);
        assert_eq!(status.get_current_difficulty(), DEFAULT_DIFFICULTY);
        assert_eq!(status.get_newest_hash().len(), 64);
        assert!(status.get_newest_hash().starts_with("00"));
        assert!(mempool.is_empty().expect("is_empty failed"));

        let genesis = chain.newest_block().await.expect("newest failed");
        assert_eq!(genesis.get_prev_hash(), "");
        assert_eq!(genesis.get_height(), 1);
        assert_eq!(genesis.get_transactions().len(), 1);
        assert!(genesis.get_transactions()[0].is_coinbase());
    }

    #[tokio::test]
    async fn test_blocks_link_and_traverse_newest_first() {
        let (chain, mempool, _dir) = scratch_chain().await;
        for _ in 0..3 {
            chain
                .add_block("miner-address", &mempool)
                .await
                .expect("add_block failed");
        }

        let blocks = chain.all_blocks().await.expect("all_blocks failed");
        assert_eq!(blocks.len(), 4);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.get_height(), (4 - i) as u64);
        }
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].get_prev_hash(), pair[1].get_hash());
            let parent = chain
                .find_block(pair[0].get_prev_hash())
                .expect("parent lookup failed");
            assert_eq!(parent.get_height(), pair[0].get_height() - 1);
        }
    }

    #[tokio::test]
    async fn test_head_survives_restart() {
        let (store, mempool, _dir) = scratch_chain_parts();
        let before = {
            let chain = Chain::initialize(store.clone(), "miner-address", &mempool)
                .await
                .expect("Failed to initialize chain");
            chain
                .add_block("miner-address", &mempool)
                .await
                .expect("add_block failed");
            chain.status().await
        };

        let restored = Chain::initialize(store, "miner-address", &mempool)
            .await
            .expect("Failed to reopen chain");
        assert_eq!(restored.status().await, before);
    }

    #[tokio::test]
    async fn test_find_block_missing() {
        let (chain, _mempool, _dir) = scratch_chain().await;
        let err = chain.find_block("00ab").expect_err("should be missing");
        assert!(matches!(err, NodeError::BlockNotFound));
    }

    #[test]
    fn test_recalculation_boundaries() {
        // Expected epoch duration is 10 minutes with a ±2 tolerance.
        let epoch = |minutes: i64| recalculated_difficulty(2, minutes * 60, 0);
        assert_eq!(epoch(2), 3); // 5 blocks in 2 minutes: too fast
        assert_eq!(epoch(8), 3); // boundary: still too fast
        assert_eq!(epoch(9), 2); // inside the band
        assert_eq!(epoch(11), 2); // inside the band
        assert_eq!(epoch(12), 1); // boundary: too slow
        assert_eq!(epoch(20), 1); // too slow
    }

    #[test]
    fn test_difficulty_never_drops_below_one() {
        assert_eq!(recalculated_difficulty(1, 100 * 60, 0), 1);
    }

    #[tokio::test]
    async fn test_difficulty_bumps_after_fast_epoch() {
        let (chain, mempool, _dir) = scratch_chain().await;
        // Mine through the first epoch; wall-clock is a few seconds at most,
        // far below the 8-minute fast threshold.
        for _ in 0..4 {
            chain
                .add_block("miner-address", &mempool)
                .await
                .expect("add_block failed");
        }
        assert_eq!(chain.status().await.get_height(), 5);

        let block6 = chain
            .add_block("miner-address", &mempool)
            .await
            .expect("add_block failed");
        assert_eq!(block6.get_difficulty(), DEFAULT_DIFFICULTY + 1);
        assert_eq!(
            chain.status().await.get_current_difficulty(),
            DEFAULT_DIFFICULTY + 1
        );
    }

    #[tokio::test]
    async fn test_add_peer_block_extends_head() {
        let (chain, mempool, _dir) = scratch_chain().await;
        let head = chain.status().await;

        let coinbase = crate::core::Tx::new_coinbase("peer-miner").expect("coinbase failed");
        let peer_block = Block::mine(
            head.get_newest_hash().to_string(),
            head.get_height() + 1,
            1,
            vec![coinbase],
        )
        .expect("mine failed");

        chain
            .add_peer_block(peer_block.clone(), &mempool, true)
            .await
            .expect("add_peer_block failed");

        let status = chain.status().await;
        assert_eq!(status.get_height(), 2);
        assert_eq!(status.get_newest_hash(), peer_block.get_hash());
        assert_eq!(status.get_current_difficulty(), 1);
    }

    #[tokio::test]
    async fn test_add_peer_block_drops_confirmed_txs() {
        let (chain, mempool, _dir) = scratch_chain().await;
        let head = chain.status().await;

        let pending = crate::core::Tx::new_coinbase("somebody").expect("coinbase failed");
        mempool.insert(pending.clone()).expect("insert failed");

        let peer_block = Block::mine(
            head.get_newest_hash().to_string(),
            head.get_height() + 1,
            1,
            vec![pending],
        )
        .expect("mine failed");
        chain
            .add_peer_block(peer_block, &mempool, true)
            .await
            .expect("add_peer_block failed");

        assert!(mempool.is_empty().expect("is_empty failed"));
    }

    #[tokio::test]
    async fn test_add_peer_block_validation_rejects_unlinked() {
        let (chain, mempool, _dir) = scratch_chain().await;

        let coinbase = crate::core::Tx::new_coinbase("peer-miner").expect("coinbase failed");
        let unlinked = Block::mine("00ab".to_string(), 9, 1, vec![coinbase]).expect("mine failed");

        let err = chain
            .add_peer_block(unlinked.clone(), &mempool, true)
            .await
            .expect_err("should reject");
        assert!(matches!(err, NodeError::InvalidBlock));
        assert_eq!(chain.status().await.get_height(), 1);

        // Without validation the same block is accepted wholesale.
        chain
            .add_peer_block(unlinked, &mempool, false)
            .await
            .expect("permissive add failed");
        assert_eq!(chain.status().await.get_height(), 2);
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_chain() {
        let (chain, mempool, _dir) = scratch_chain().await;
        let old_genesis_hash = chain.status().await.get_newest_hash().to_string();

        // A longer chain built independently by another node.
        let (other, other_mempool, _other_dir) = scratch_chain().await;
        for _ in 0..2 {
            other
                .add_block("other-miner", &other_mempool)
                .await
                .expect("add_block failed");
        }
        let incoming = other.all_blocks().await.expect("all_blocks failed");

        chain
            .replace(incoming.clone(), true)
            .await
            .expect("replace failed");

        let status = chain.status().await;
        assert_eq!(status.get_height(), 3);
        assert_eq!(status.get_newest_hash(), incoming[0].get_hash());
        assert_eq!(
            chain.all_blocks().await.expect("all_blocks failed").len(),
            3
        );
        // The old bucket contents are gone.
        assert!(matches!(
            chain.find_block(&old_genesis_hash),
            Err(NodeError::BlockNotFound)
        ));
    }

    #[tokio::test]
    async fn test_replace_rejects_broken_chain() {
        let (chain, _mempool, _dir) = scratch_chain().await;

        let coinbase = crate::core::Tx::new_coinbase("peer-miner").expect("coinbase failed");
        let orphan = Block::mine("00ab".to_string(), 2, 1, vec![coinbase]).expect("mine failed");

        let err = chain
            .replace(vec![orphan], true)
            .await
            .expect_err("should reject");
        assert!(matches!(err, NodeError::InvalidBlock));

        let err = chain.replace(vec![], true).await.expect_err("empty chain");
        assert!(matches!(err, NodeError::InvalidBlock));
    }
}
