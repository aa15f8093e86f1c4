use crate::error::{NodeError, Result};
use crate::node::NodeContext;
use crate::web::handlers;
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The REST router, including the `/ws` peer-transport upgrade.
pub fn router(ctx: Arc<NodeContext>) -> Router {
    Router::new()
        .route("/", get(handlers::documentation))
        .route("/status", get(handlers::get_status))
        .route(
            "/blocks",
            get(handlers::get_blocks).post(handlers::post_blocks),
        )
        .route("/blocks/{hash}", get(handlers::get_block))
        .route("/balance/{address}", get(handlers::get_balance))
        .route("/mempool", get(handlers::get_mempool))
        .route("/transactions", post(handlers::post_transactions))
        .route("/wallet", get(handlers::get_wallet))
        .route(
            "/peers",
            get(handlers::get_peers).post(handlers::post_peers),
        )
        .route("/ws", get(handlers::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serves the REST API on `0.0.0.0:port` until the process exits.
pub async fn serve(ctx: NodeContext, port: u16) -> Result<()> {
    let app = router(Arc::new(ctx));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NodeError::Io(e.to_string()))?;
    info!("REST API listening on http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| NodeError::Io(e.to_string()))
}
