pub mod chain;
pub use chain::{Chain, ChainState};

pub mod config;
pub use config::NodeConfig;

pub mod core;
pub use self::core::*;

pub mod error;
pub use error::*;

pub mod node;
pub use node::NodeContext;

pub mod p2p;

pub mod store;
pub use store::Store;

pub mod util;
pub use util::*;

pub mod wallet;
pub use wallet::Wallet;

pub mod web;
// Don't re-export web: handler and model names stay namespaced.
