//! Live-update WebSocket endpoint.
//!
//! A device connects with `?session_id=<id>&device=<role>` and receives a
//! hello, the current snapshot if one exists, then one state update per
//! accepted event, in submission order.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::clock::now_ms;
use super::http::SharedState;
use super::rooms::{ServerMessage, Subscriber};

/// Policy violation close code (RFC 6455).
const CLOSE_POLICY: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    #[serde(default)]
    device: Option<String>,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<SharedState>,
) -> Response {
    ws.on_upgrade(move |socket| handle(socket, query, state))
}

async fn handle(mut socket: WebSocket, query: WsQuery, state: SharedState) {
    let Some(session_id) = query.session_id else {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY,
                reason: "missing session_id".into(),
            })))
            .await;
        return;
    };
    let device = query.device.unwrap_or_else(|| "unknown".to_string());

    let (tx, rx) = mpsc::unbounded_channel();
    let subscriber = Subscriber::new(device.clone(), tx.clone());

    // Hello goes in first; attach then enqueues the catch-up snapshot under
    // the session lock, so no live update can slip in between.
    let _ = tx.send(ServerMessage::Hello {
        session_id: session_id.clone(),
        device: device.clone(),
        ts: now_ms(),
    });
    let subscriber_id = match state.engine.attach(&session_id, subscriber).await {
        Ok(id) => id,
        Err(err) => {
            warn!(%session_id, "subscriber attach failed: {err}");
            return;
        }
    };
    drop(tx);

    debug!(%session_id, %device, subscriber = subscriber_id, "device connected");
    pump(&mut socket, rx).await;

    state.engine.detach(&session_id, subscriber_id);
    debug!(%session_id, %device, subscriber = subscriber_id, "device disconnected");
}

/// Forward queued messages to the socket until either side goes away.
async fn pump(socket: &mut WebSocket, mut rx: mpsc::UnboundedReceiver<ServerMessage>) {
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let Ok(text) = serde_json::to_string(&message) else { break };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Devices only listen on this channel; inbound frames
                    // (pings, stray text) are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
