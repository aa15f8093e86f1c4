use std::path::PathBuf;

pub const DEFAULT_WALLET_FILE: &str = "zerocoin.wallet";

/// Node configuration, constructed once in `main` from the CLI flags and
/// passed by reference through the application.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// The open listener port; peers reach this node at `<ip>:<port>`.
    pub port: u16,
    /// Directory of the sled database (one per node instance).
    pub data_dir: PathBuf,
    /// Wallet key file.
    pub wallet_path: PathBuf,
    /// Verify proof-of-work and prev-hash links on blocks and chains received
    /// from peers. Turning this off restores the permissive sync behavior of
    /// early nodes.
    pub validate_peer_data: bool,
}

impl NodeConfig {
    pub fn new(port: u16) -> Self {
        NodeConfig {
            port,
            data_dir: PathBuf::from(format!("zerocoin_{port}.db")),
            wallet_path: PathBuf::from(DEFAULT_WALLET_FILE),
            validate_peer_data: true,
        }
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    pub fn with_wallet_path(mut self, wallet_path: PathBuf) -> Self {
        self.wallet_path = wallet_path;
        self
    }

    pub fn with_validate_peer_data(mut self, validate: bool) -> Self {
        self.validate_peer_data = validate;
        self
    }
}
