//! `WebSocket` event stream.
//!
//! Clients connect to `GET /api/v1/events?namespace=&name=` and receive a
//! JSON text frame for every normalized event whose routing key matches
//! their filter. Empty or missing parameters match everything.
//!
//! The session registers a [`ChannelConnection`] with the hub. Outbound
//! frames are drained from its queue; inbound traffic is only inspected
//! for close frames and pings. If the hub drops the subscriber (queue
//! full, i.e. the client stopped reading) the socket is closed.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use lairwatch_relay::{ChannelConnection, SubscriptionFilter};
use tracing::{debug, info};

use crate::sink::AttackSink;
use crate::state::AppState;

/// Query parameters for `GET /api/v1/events`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct EventsQuery {
    /// Only deliver events from this namespace.
    #[serde(default)]
    pub namespace: String,
    /// Only deliver events about resources with this name.
    #[serde(default)]
    pub name: String,
}

/// Upgrade an HTTP request to a `WebSocket` event subscription.
///
/// # Route
///
/// `GET /api/v1/events`
pub async fn events<A: AttackSink>(
    ws: WebSocketUpgrade,
    Query(query): Query<EventsQuery>,
    State(state): State<Arc<AppState<A>>>,
) -> impl IntoResponse {
    let filter = SubscriptionFilter::new(query.namespace, query.name);
    ws.on_upgrade(move |socket| handle_ws(socket, state, filter))
}

async fn handle_ws<A: AttackSink>(
    mut socket: WebSocket,
    state: Arc<AppState<A>>,
    filter: SubscriptionFilter,
) {
    let (connection, mut outbox) = ChannelConnection::new(state.queue_capacity);
    let id = state.hub.add(connection, filter.clone()).await;
    info!(
        subscriber = %id,
        namespace = filter.namespace,
        name = filter.name,
        "subscriber connected"
    );

    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            () = shutdown.wait() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            frame = outbox.recv() => {
                if let Some(frame) = frame {
                    if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                        debug!(subscriber = %id, "send failed");
                        break;
                    }
                } else {
                    debug!(subscriber = %id, "dropped by hub");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %id, "websocket error: {e}");
                        break;
                    }
                    // Client-to-server payloads carry no meaning here.
                    _ => {}
                }
            }
        }
    }

    state.hub.remove(id).await;
    info!(subscriber = %id, "subscriber disconnected");
}
