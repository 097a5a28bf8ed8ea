//! WebSocket connection gateway.
//!
//! Each accepted socket is addressed by its request path. Inbound text frames
//! go to the router untouched; messages routed to the address are written back
//! out as single text frames.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::Uri,
    response::IntoResponse,
    Router,
};
use futures::{SinkExt, StreamExt};
use parley_shared::Reply;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::registry::{ChannelRegistry, Delivery, Subscription};
use crate::router::RouterHandle;

#[derive(Clone)]
pub struct GatewayState {
    pub registry: ChannelRegistry,
    pub router: RouterHandle,
}

/// Every path is accepted; the path becomes the connection's address.
pub fn build_gateway(state: GatewayState) -> Router {
    Router::new()
        .fallback(ws_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    uri: Uri,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    let address = uri.path().to_string();
    ws.on_upgrade(move |socket| handle_socket(socket, address, state))
}

/// Why a connection loop ended.
#[derive(Debug)]
enum Closed {
    ByClient,
    TransportError,
    Displaced,
}

async fn handle_socket(socket: WebSocket, address: String, state: GatewayState) {
    let Subscription { id, address, mut rx } = state.registry.register(&address).await;
    info!(address = %address, conn = id, "Connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = state.router.admit(&text) {
                        debug!(address = %address, error = %e, "Rejected inbound frame");
                        let reply = serde_json::to_string(&Reply::<()>::error(e.to_string()))
                            .unwrap_or_default();
                        if ws_tx.send(Message::Text(reply)).await.is_err() {
                            break Closed::TransportError;
                        }
                        continue;
                    }
                    state.router.route(text);
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(address = %address, len = data.len(), "Ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break Closed::ByClient,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(address = %address, error = %e, "WebSocket read failed");
                    break Closed::TransportError;
                }
            },

            delivery = rx.recv() => match delivery {
                Some(Delivery { payload, ack }) => {
                    if let Err(e) = ws_tx.send(Message::Text(payload)).await {
                        debug!(address = %address, error = %e, "WebSocket write failed");
                        break Closed::TransportError;
                    }
                    let _ = ack.send(());
                }
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break Closed::Displaced;
                }
            },
        }
    };

    // Queued deliveries are dropped with the receiver.
    state.registry.unregister(&address, id).await;
    rx.close();

    info!(address = %address, conn = id, ?reason, "Connection closed");
}

pub async fn serve(state: GatewayState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_gateway(state);

    info!(addr = %addr, "Starting WebSocket gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
