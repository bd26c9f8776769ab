//! Websocket notifier (spec §6). Upgrades `/websocket` and fans internal
//! bus topics (tx lifecycle, price ticks, trigger firings) out to
//! subscribed clients. Per spec §5c: "Websocket broadcast fan-out uses a
//! per-client bounded send buffer; overflow closes the client."

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::api::AppState;
use crate::bus::EventBus;

/// Bounded per-client outbound buffer (spec §5c); a client that can't keep
/// up gets disconnected rather than letting the buffer grow unbounded.
const CLIENT_SEND_BUFFER: usize = 256;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Server -> client envelope (spec §6: "`{type, id, timestamp, data}`").
#[derive(Serialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: &'static str,
    id: Uuid,
    timestamp: chrono::DateTime<Utc>,
    data: serde_json::Value,
}

impl Envelope {
    fn new(event_type: &'static str, data: serde_json::Value) -> Self {
        Self { event_type, id: Uuid::new_v4(), timestamp: Utc::now(), data }
    }
}

/// Client -> server control frame (spec §6: "`{action ∈ {subscribe,
/// unsubscribe, ping}, data}`").
#[derive(Deserialize)]
struct ClientFrame {
    action: ClientAction,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum ClientAction {
    Subscribe,
    Unsubscribe,
    Ping,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/websocket", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.bus.clone()))
}

async fn handle_socket(socket: WebSocket, bus: EventBus) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(CLIENT_SEND_BUFFER);

    let mut tx_rx = bus.tx.subscribe();
    let mut price_rx = bus.price.subscribe();
    let mut trigger_rx = bus.trigger_event.subscribe();

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: HashSet<String> = all_event_types();
    let mut last_activity = tokio::time::Instant::now();
    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            _ = ping_ticker.tick() => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    tracing::debug!("closing idle websocket client");
                    break;
                }
                if out_tx.try_send(Message::Ping(Vec::new())).is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = tokio::time::Instant::now();
                        if let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) {
                            apply_client_frame(frame, &mut subscriptions);
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                        last_activity = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            change = tx_rx.recv() => {
                if !forward(&out_tx, &subscriptions, "transaction", change, |c| serde_json::to_value(c).unwrap_or_default()) {
                    break;
                }
            }
            update = price_rx.recv() => {
                if !forward(&out_tx, &subscriptions, "price_feed", update, |u| serde_json::to_value(u).unwrap_or_default()) {
                    break;
                }
            }
            event = trigger_rx.recv() => {
                if !forward(&out_tx, &subscriptions, "trigger", event, |e| serde_json::to_value(e).unwrap_or_default()) {
                    break;
                }
            }
        }
    }

    writer.abort();
}

fn all_event_types() -> HashSet<String> {
    [
        "transaction",
        "service_status",
        "price_feed",
        "trigger",
        "function",
        "random_number",
        "oracle",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn apply_client_frame(frame: ClientFrame, subscriptions: &mut HashSet<String>) {
    let event_type = frame.data.get("event_type").and_then(|v| v.as_str());
    match (frame.action, event_type) {
        (ClientAction::Subscribe, Some(t)) => {
            subscriptions.insert(t.to_string());
        }
        (ClientAction::Unsubscribe, Some(t)) => {
            subscriptions.remove(t);
        }
        (ClientAction::Ping, _) => {}
        _ => {}
    }
}

/// Forwards one bus item as an envelope if the client is subscribed to its
/// type, dropping lagged items and returning `false` on a closed upstream
/// or a full client buffer (spec §5c: overflow closes the client).
fn forward<T>(
    out_tx: &mpsc::Sender<Message>,
    subscriptions: &HashSet<String>,
    event_type: &'static str,
    item: Result<T, broadcast::error::RecvError>,
    to_value: impl FnOnce(&T) -> serde_json::Value,
) -> bool {
    let item = match item {
        Ok(item) => item,
        Err(broadcast::error::RecvError::Lagged(_)) => return true,
        Err(broadcast::error::RecvError::Closed) => return false,
    };
    if !subscriptions.contains(event_type) {
        return true;
    }
    let envelope = Envelope::new(event_type, to_value(&item));
    let Ok(text) = serde_json::to_string(&envelope) else {
        return true;
    };
    out_tx.try_send(Message::Text(text)).is_ok()
}
