use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
};
use zerocoin::{NodeConfig, NodeContext, Result, web};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// REST API plus the /ws peer transport.
    Rest,
    /// HTML explorer only.
    Html,
    /// REST on the node port, explorer on port + 1000.
    Both,
}

#[derive(Debug, Parser)]
#[command(name = "zerocoin", about = "A small proof-of-work cryptocurrency node")]
struct Opt {
    /// Port of the node's listener.
    #[arg(short, long, default_value_t = 4000)]
    port: u16,

    /// Which surface to serve.
    #[arg(short, long, value_enum, default_value_t = Mode::Rest)]
    mode: Mode,

    /// Verify proof-of-work and prev-hash links on blocks and chains
    /// received from peers.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    validate_peer_data: bool,

    /// Database directory; defaults to zerocoin_<port>.db.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Wallet key file; defaults to zerocoin.wallet.
    #[arg(long)]
    wallet: Option<PathBuf>,
}

fn initialize_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .init();
}

async fn run(opt: Opt) -> Result<()> {
    let mut config = NodeConfig::new(opt.port).with_validate_peer_data(opt.validate_peer_data);
    if let Some(data_dir) = opt.data_dir {
        config = config.with_data_dir(data_dir);
    }
    if let Some(wallet) = opt.wallet {
        config = config.with_wallet_path(wallet);
    }

    let ctx = NodeContext::initialize(config).await?;
    info!(address = ctx.wallet_address(), "wallet ready");

    match opt.mode {
        Mode::Rest => web::server::serve(ctx, opt.port).await,
        Mode::Html => web::explorer::serve(ctx, opt.port).await,
        Mode::Both => {
            let explorer_ctx = ctx.clone();
            let explorer_port = opt.port + 1000;
            tokio::spawn(async move {
                if let Err(err) = web::explorer::serve(explorer_ctx, explorer_port).await {
                    error!("explorer failed: {err}");
                }
            });
            web::server::serve(ctx, opt.port).await
        }
    }
}

#[tokio::main]
async fn main() {
    initialize_logging();
    let opt = Opt::parse();
    if let Err(err) = run(opt).await {
        error!("fatal: {err}");
        std::process::exit(1);
    }
}
