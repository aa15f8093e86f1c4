//! The HTML explorer: one page listing the chain newest-first with a mine
//! button. Served instead of (or next to) the REST API depending on the
//! `--mode` flag.

use crate::error::{NodeError, Result};
use crate::node::NodeContext;
use crate::web::handlers::ApiError;
use axum::Router;
use axum::extract::State;
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub fn router(ctx: Arc<NodeContext>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/mine", post(mine))
        .with_state(ctx)
}

async fn home(State(ctx): State<Arc<NodeContext>>) -> std::result::Result<Html<String>, ApiError> {
    let status = ctx.status().await;
    let blocks = ctx.all_blocks().await?;

    let mut rows = String::new();
    for block in &blocks {
        rows.push_str(&format!(
            "<tr><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            block.get_height(),
            block.get_hash(),
            block.get_difficulty(),
            block.get_timestamp(),
            block.get_transactions().len(),
        ));
    }

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>zerocoin explorer</title></head>\n<body>\n\
         <h1>zerocoin</h1>\n\
         <p>height {} &middot; difficulty {} &middot; newest <code>{}</code></p>\n\
         <form method=\"post\" action=\"/mine\"><button>Mine a block</button></form>\n\
         <table border=\"1\" cellpadding=\"4\">\n\
         <tr><th>height</th><th>hash</th><th>difficulty</th><th>timestamp</th><th>txs</th></tr>\n\
         {}\
         </table>\n</body>\n</html>\n",
        status.get_height(),
        status.get_current_difficulty(),
        status.get_newest_hash(),
        rows,
    )))
}

async fn mine(State(ctx): State<Arc<NodeContext>>) -> std::result::Result<Redirect, ApiError> {
    ctx.mine_block().await?;
    Ok(Redirect::to("/"))
}

/// Serves the explorer on `0.0.0.0:port` until the process exits.
pub async fn serve(ctx: NodeContext, port: u16) -> Result<()> {
    let app = router(Arc::new(ctx));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NodeError::Io(e.to_string()))?;
    info!("explorer listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .map_err(|e| NodeError::Io(e.to_string()))
}
