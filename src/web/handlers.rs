use crate::core::block::Block;
use crate::core::transaction::Tx;
use crate::error::NodeError;
use crate::node::NodeContext;
use crate::p2p::peer::PeerSocket;
use crate::p2p::peer::spawn_session;
use crate::web::models::{
    AddPeerBody, AddTxBody, BalanceQuery, BalanceResponse, ErrorResponse, UrlDescription,
    WalletResponse, WsQuery,
};
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Maps domain errors onto HTTP statuses; every failure carries the
/// `{"errorMessage": …}` body.
pub struct ApiError(NodeError);

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NodeError::BlockNotFound => StatusCode::NOT_FOUND,
            NodeError::NotEnoughFunds
            | NodeError::TxInvalid
            | NodeError::InvalidBlock
            | NodeError::Peer(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error_message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn documentation() -> Json<Vec<UrlDescription>> {
    Json(vec![
        UrlDescription::new("/", "GET", "See documentation", None),
        UrlDescription::new("/status", "GET", "See the status of the blockchain", None),
        UrlDescription::new("/blocks", "GET", "See all blocks", None),
        UrlDescription::new("/blocks", "POST", "Mine a block", None),
        UrlDescription::new("/blocks/{hash}", "GET", "See a block", None),
        UrlDescription::new(
            "/balance/{address}",
            "GET",
            "Get balance or unspent outputs for an address",
            None,
        ),
        UrlDescription::new("/mempool", "GET", "See unconfirmed transactions", None),
        UrlDescription::new(
            "/transactions",
            "POST",
            "Make a transaction",
            Some("{\"To\": \"address\", \"Amount\": 50}"),
        ),
        UrlDescription::new("/wallet", "GET", "See the node's wallet address", None),
        UrlDescription::new("/peers", "GET", "See connected peers", None),
        UrlDescription::new(
            "/peers",
            "POST",
            "Connect to a peer",
            Some("{\"Address\": \"127.0.0.1\", \"Port\": 4000}"),
        ),
        UrlDescription::new("/ws", "GET", "Upgrade to the peer transport", None),
    ])
}

pub async fn get_status(State(ctx): State<Arc<NodeContext>>) -> Response {
    Json(ctx.status().await).into_response()
}

pub async fn get_blocks(
    State(ctx): State<Arc<NodeContext>>,
) -> Result<Json<Vec<Block>>, ApiError> {
    Ok(Json(ctx.all_blocks().await?))
}

pub async fn post_blocks(
    State(ctx): State<Arc<NodeContext>>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let block = ctx.mine_block().await?;
    Ok((StatusCode::CREATED, Json(block)))
}

pub async fn get_block(
    State(ctx): State<Arc<NodeContext>>,
    Path(hash): Path<String>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(ctx.find_block(hash.as_str())?))
}

pub async fn get_balance(
    State(ctx): State<Arc<NodeContext>>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Response, ApiError> {
    if query.total {
        let balance = ctx.balance(address.as_str()).await?;
        Ok(Json(BalanceResponse { address, balance }).into_response())
    } else {
        Ok(Json(ctx.unspent_outputs(address.as_str()).await?).into_response())
    }
}

pub async fn get_mempool(State(ctx): State<Arc<NodeContext>>) -> Result<Json<Vec<Tx>>, ApiError> {
    Ok(Json(ctx.mempool_transactions()?))
}

pub async fn post_transactions(
    State(ctx): State<Arc<NodeContext>>,
    Json(body): Json<AddTxBody>,
) -> Result<(StatusCode, Json<Tx>), ApiError> {
    let tx = ctx.send_transaction(body.to.as_str(), body.amount).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn get_wallet(State(ctx): State<Arc<NodeContext>>) -> Json<WalletResponse> {
    Json(WalletResponse {
        address: ctx.wallet_address().to_string(),
    })
}

pub async fn get_peers(State(ctx): State<Arc<NodeContext>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(ctx.peer_keys()?))
}

pub async fn post_peers(
    State(ctx): State<Arc<NodeContext>>,
    Json(body): Json<AddPeerBody>,
) -> Result<StatusCode, ApiError> {
    ctx.add_peer(body.address.as_str(), body.port, true).await?;
    Ok(StatusCode::OK)
}

/// Upgrades an inbound connection to the peer transport. The peer's IP comes
/// from the socket; its open-listener port from the query string.
pub async fn ws_upgrade(
    State(ctx): State<Arc<NodeContext>>,
    Query(query): Query<WsQuery>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let address = remote.ip().to_string();
        if let Err(err) = spawn_session(
            (*ctx).clone(),
            PeerSocket::Inbound(socket),
            address,
            query.open_port,
        ) {
            warn!(error = %err, "failed to start inbound peer session");
        }
    })
}
