use crate::core::transaction::Tx;
use crate::error::{NodeError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// The `Mempool` holds transactions waiting to be confirmed by the next mined
/// block. It lives purely in memory and is rebuilt empty on restart.
pub struct Mempool {
    inner: RwLock<HashMap<String, Tx>>,
}

impl Mempool {
    pub fn new() -> Mempool {
        Mempool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn contains(&self, tx_id: &str) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.contains_key(tx_id))
    }

    pub fn insert(&self, tx: Tx) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        inner.insert(tx.get_id().to_string(), tx);
        Ok(())
    }

    /// Snapshot of the pending transactions. Balance derivation scans this
    /// ahead of the chain, and input selection shadows it.
    pub fn pending(&self) -> Result<Vec<Tx>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.values().cloned().collect())
    }

    /// Drops every pending transaction that appears in a freshly applied peer
    /// block.
    pub fn remove_confirmed(&self, txs: &[Tx]) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        for tx in txs {
            inner.remove(tx.get_id());
        }
        Ok(())
    }

    ///
    /// The `txs_to_confirm` function assembles the transaction list for the
    /// next block: the miner's coinbase first, then every pending
    /// transaction. The map is emptied in the same critical section.
    ///
    pub fn txs_to_confirm(&self, miner_address: &str) -> Result<Vec<Tx>> {
        let coinbase = Tx::new_coinbase(miner_address)?;
        let mut inner = self
            .inner
            .write()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        let mut txs = vec![coinbase];
        txs.extend(inner.drain().map(|(_, tx)| tx));
        Ok(txs)
    }

    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| NodeError::Lock(e.to_string()))?;
        Ok(inner.is_empty())
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}
