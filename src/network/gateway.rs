//! Websocket upgrade endpoint, grounded on the teacher's
//! `Gateway::bind`/`run` accept loop, generalized from a raw TCP
//! listener to an axum router since the transport here is HTTP
//! upgrade rather than bare sockets.

use crate::dispatcher::Dispatcher;
use crate::network::connection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: broadcast::Sender<()>,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let transport_id = uuid::Uuid::new_v4();
        info!(%transport_id, "connection accepted");
        connection::run(socket, transport_id, state.dispatcher, state.shutdown.subscribe()).await;
        info!(%transport_id, "connection closed");
    })
}
