// Core data model: blocks, transactions, and the pending-transaction pool.

pub mod block;
pub mod mempool;
pub mod transaction;

pub use block::Block;
pub use mempool::Mempool;
pub use transaction::{COINBASE_SIGNATURE, MINER_REWARD, Tx, TxIn, TxOut, UTxOut};
