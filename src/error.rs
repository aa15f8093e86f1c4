use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum NodeError {
    // Domain outcomes, surfaced to API callers
    #[error("this block is not in the blockchain")]
    BlockNotFound,
    #[error("not enough funds")]
    NotEnoughFunds,
    #[error("tx invalid")]
    TxInvalid,
    #[error("invalid block")]
    InvalidBlock,

    // Corruption of persisted or wire state
    #[error("codec error: {0}")]
    Codec(String),
    #[error("storage error: {0}")]
    Storage(String),

    // Wallet file / key handling
    #[error("wallet error: {0}")]
    Wallet(String),

    // Poisoned mempool or peer-registry lock
    #[error("poisoned lock: {0}")]
    Lock(String),

    // Listener / socket failures outside a peer session
    #[error("io error: {0}")]
    Io(String),

    // Peer session failures; these close only the affected session
    #[error("peer error: {0}")]
    Peer(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
