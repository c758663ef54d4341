//! WebSocket route handler.
//!
//! Handles the upgrade, the message loop, event fan-in and cleanup.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{
    connection::{Connection, CoordinatorContext},
    messages::Ready,
};
use crate::events::{ChannelEvent, EventBus, Subscription};
use crate::server::metrics;
use crate::server::state::{GuardedCoordinator, GuardedEventBus};

const OUTGOING_QUEUE: usize = 64;

/// WebSocket upgrade handler for `GET /v1/ws`.
///
/// Connections start unauthenticated; identity is established by the
/// `Authenticate` request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(coordinator): State<GuardedCoordinator>,
    State(event_bus): State<GuardedEventBus>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator, event_bus))
}

async fn handle_socket(socket: WebSocket, ctx: Arc<CoordinatorContext>, event_bus: Arc<EventBus>) {
    let connection = Connection::new(ctx);
    let session_id = connection.session_id().to_string();
    metrics::ws_connection_opened();
    debug!("WebSocket connected: {}", session_id);

    let (ws_sink, ws_stream) = socket.split();
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(OUTGOING_QUEUE);

    let ready = serde_json::to_string(&Ready { ready: true }).unwrap_or_default();
    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx, ready));

    let connection = process_incoming(ws_stream, connection, &event_bus, &outgoing_tx).await;

    outgoing_handle.abort();
    metrics::ws_connection_closed();
    info!(
        "WebSocket disconnected: {} (channel: {:?})",
        connection.session_id(),
        connection.channel()
    );
}

/// Forward messages from the outgoing channel to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<String>,
    initial_msg: String,
) {
    if ws_sink.send(Message::Text(initial_msg.into())).await.is_err() {
        return;
    }

    while let Some(json) = outgoing_rx.recv().await {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}

async fn enqueue(outgoing: &mpsc::Sender<String>, msg: &impl Serialize) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => outgoing.send(json).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize WebSocket message: {}", e);
            true
        }
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<ChannelEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

enum Step {
    Frame(Option<Result<Message, axum::Error>>),
    Event(Option<ChannelEvent>),
}

/// Runs the connection until the client goes away. Returns the connection
/// for cleanup logging.
async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut connection: Connection,
    event_bus: &EventBus,
    outgoing: &mpsc::Sender<String>,
) -> Connection {
    let mut subscription: Option<Subscription> = None;

    loop {
        let step = tokio::select! {
            frame = ws_stream.next() => Step::Frame(frame),
            event = next_event(&mut subscription) => Step::Event(event),
        };

        match step {
            Step::Frame(Some(Ok(Message::Text(text)))) => {
                let reply = connection.handle_text(text.as_str()).await;
                if !enqueue(outgoing, &reply).await {
                    break;
                }
                let subscribed = subscription.as_ref().map(|s| s.channel());
                if connection.channel() != subscribed {
                    subscription = connection.channel().map(|c| event_bus.subscribe(c));
                }
            }
            Step::Frame(Some(Ok(Message::Binary(_)))) => {
                debug!("Received binary message, ignoring");
            }
            Step::Frame(Some(Ok(Message::Ping(_)))) => {
                // Axum/tungstenite handles pong automatically
                debug!("Received ping");
            }
            Step::Frame(Some(Ok(Message::Pong(_)))) => {
                debug!("Received pong");
            }
            Step::Frame(Some(Ok(Message::Close(_)))) => {
                debug!("Received close frame");
                break;
            }
            Step::Frame(Some(Err(e))) => {
                debug!("WebSocket error: {}", e);
                break;
            }
            Step::Frame(None) => break,
            Step::Event(Some(event)) => {
                if let Some(push) = connection.route_event(event).await {
                    if !enqueue(outgoing, &push).await {
                        break;
                    }
                }
            }
            Step::Event(None) => {
                debug!("Event subscription of {} closed", connection.session_id());
                subscription = None;
            }
        }
    }

    connection
}
