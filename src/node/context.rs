//! Node context - the central coordination point for node operations.
//!
//! `NodeContext` wires the chain, mempool, wallet and peer registry together
//! and exposes the high-level operations the REST surface and the p2p
//! protocol handlers call. There is exactly one of everything per process:
//! all components are constructed once here and shared by reference.

use crate::chain::{Chain, ChainState, utxo};
use crate::config::NodeConfig;
use crate::core::block::Block;
use crate::core::mempool::Mempool;
use crate::core::transaction::{Tx, UTxOut, validate};
use crate::error::{NodeError, Result};
use crate::p2p;
use crate::p2p::peer::PeerRegistry;
use crate::store::Store;
use crate::wallet::Wallet;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct NodeContext {
    config: NodeConfig,
    wallet: Arc<Wallet>,
    chain: Arc<Chain>,
    mempool: Arc<Mempool>,
    peers: Arc<PeerRegistry>,
}

impl NodeContext {
    /// Opens the store and wallet, restores or mines the chain, and returns
    /// the ready node.
    pub async fn initialize(config: NodeConfig) -> Result<NodeContext> {
        let store = Store::open(config.data_dir.as_path())?;
        let wallet = Arc::new(Wallet::open(config.wallet_path.as_path())?);
        let mempool = Arc::new(Mempool::new());
        let chain = Arc::new(Chain::initialize(store, wallet.address(), &mempool).await?);
        Ok(NodeContext {
            config,
            wallet,
            chain,
            mempool,
            peers: Arc::new(PeerRegistry::new()),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn wallet_address(&self) -> &str {
        self.wallet.address()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    //=========================================================================
    // Chain operations
    //=========================================================================

    pub async fn status(&self) -> ChainState {
        self.chain.status().await
    }

    pub async fn all_blocks(&self) -> Result<Vec<Block>> {
        self.chain.all_blocks().await
    }

    pub fn find_block(&self, hash: &str) -> Result<Block> {
        self.chain.find_block(hash)
    }

    /// Mines the next block out of the mempool and gossips it to every peer.
    pub async fn mine_block(&self) -> Result<Block> {
        let block = self
            .chain
            .add_block(self.wallet.address(), &self.mempool)
            .await?;
        info!(
            hash = block.get_hash(),
            height = block.get_height(),
            "mined block"
        );
        p2p::broadcast_new_block(self, &block)?;
        Ok(block)
    }

    //=========================================================================
    // Transactions and balances
    //=========================================================================

    /// Builds, signs and queues a payment from the local wallet, then
    /// gossips it to every peer.
    pub async fn send_transaction(&self, to: &str, amount: i64) -> Result<Tx> {
        let blocks = self.chain.all_blocks().await?;
        let pending = self.mempool.pending()?;
        let tx = utxo::make_tx(&self.wallet, &blocks, &pending, to, amount)?;
        self.mempool.insert(tx.clone())?;
        info!(id = tx.get_id(), to, amount, "accepted local transaction");
        p2p::broadcast_new_tx(self, &tx)?;
        Ok(tx)
    }

    pub async fn unspent_outputs(&self, address: &str) -> Result<Vec<UTxOut>> {
        let blocks = self.chain.all_blocks().await?;
        let pending = self.mempool.pending()?;
        Ok(utxo::unspent_outputs(
            blocks.as_slice(),
            pending.as_slice(),
            address,
        ))
    }

    pub async fn balance(&self, address: &str) -> Result<i64> {
        let blocks = self.chain.all_blocks().await?;
        let pending = self.mempool.pending()?;
        Ok(utxo::total_balance(
            blocks.as_slice(),
            pending.as_slice(),
            address,
        ))
    }

    pub fn mempool_transactions(&self) -> Result<Vec<Tx>> {
        self.mempool.pending()
    }

    //=========================================================================
    // Peer data entry points
    //=========================================================================

    /// Applies a block announced by a peer, honoring the node's peer-data
    /// validation setting.
    pub async fn apply_peer_block(&self, block: Block) -> Result<()> {
        self.chain
            .add_peer_block(block, &self.mempool, self.config.validate_peer_data)
            .await
    }

    /// Accepts a transaction gossiped by a peer. Signatures are always
    /// verified before the mempool takes it; there is no trust flag here.
    pub async fn accept_peer_tx(&self, tx: Tx) -> Result<()> {
        let blocks = self.chain.all_blocks().await?;
        let pending = self.mempool.pending()?;
        if !validate(&tx, pending.as_slice(), blocks.as_slice()) {
            return Err(NodeError::TxInvalid);
        }
        info!(id = tx.get_id(), "accepted peer transaction");
        self.mempool.insert(tx)
    }

    /// Replaces the whole local chain with one received from a peer.
    pub async fn replace_chain(&self, blocks: Vec<Block>) -> Result<()> {
        self.chain
            .replace(blocks, self.config.validate_peer_data)
            .await
    }

    //=========================================================================
    // Peer bookkeeping
    //=========================================================================

    /// Dials a new peer, announcing this node's own listener port.
    pub async fn add_peer(&self, address: &str, port: u16, broadcast: bool) -> Result<()> {
        p2p::add_peer(self, address, port, self.config.port, broadcast).await
    }

    pub fn peer_keys(&self) -> Result<Vec<String>> {
        self.peers.keys()
    }
}
