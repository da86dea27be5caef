//! HTTP/WS listener setup, grounded on the reference gateway's
//! `build_gateway_app`/`ws_upgrade_handler` shape, trimmed to the one route
//! this core actually owns: the bus WebSocket itself. The administrative
//! HTTP surface (health, metrics, config dumps) is an explicit non-goal
//! (§1) served, if at all, by an external collaborator polling the CLI
//! admin commands rather than a route on this listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::error::Result;
use crate::state::ServerState;
use crate::ws::handle_connection;

pub fn build_app(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .with_state(state)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr))
}

/// Bind and serve until the process is terminated.
pub async fn serve(state: Arc<ServerState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.bind_address, state.config.server.port)
        .parse()
        .map_err(|e| arqonbus_common::Error::message(format!("invalid bind address: {e}")))?;
    let app = build_app(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "arqonbus-server: listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
