//! Stage-control actuator bridge (obs-websocket v5 client).
//!
//! The bridge runs as its own task owning the connection; the rest of the
//! daemon holds a cloneable [`ObsHandle`]. Scene triggers dispatched from
//! the event pipeline are fire-and-forget: failures are logged here and
//! never reach the submitting caller. Every network step runs under a
//! bounded timeout so a stalled actuator cannot back-pressure event
//! processing.

use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ObsConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ObsError {
    #[error("actuator connect failed: {0}")]
    Connect(String),

    #[error("actuator request failed: {0}")]
    Request(String),

    #[error("actuator timed out")]
    Timeout,

    #[error("actuator bridge task is gone")]
    BridgeGone,
}

enum ObsCommand {
    Health {
        reply: oneshot::Sender<bool>,
    },
    SetScene {
        scene: String,
        /// None for fire-and-forget dispatch from the event pipeline.
        reply: Option<oneshot::Sender<Result<(), ObsError>>>,
    },
}

/// Cloneable handle to the bridge task.
#[derive(Clone)]
pub struct ObsHandle {
    tx: mpsc::Sender<ObsCommand>,
    host: String,
    port: u16,
    default_scene: String,
}

impl ObsHandle {
    /// Connectivity probe: attempts a connection if none is live.
    pub async fn health(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ObsCommand::Health { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Switch to a named scene and wait for the outcome.
    pub async fn set_scene(&self, scene: impl Into<String>) -> Result<(), ObsError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ObsCommand::SetScene {
                scene: scene.into(),
                reply: Some(reply),
            })
            .await
            .map_err(|_| ObsError::BridgeGone)?;
        rx.await.map_err(|_| ObsError::BridgeGone)?
    }

    /// Fire-and-forget switch to the configured default scene.
    ///
    /// Never blocks: if the bridge's queue is full the trigger is dropped
    /// with a warning, which is the contract for pipeline side effects.
    pub fn fire_default_scene(&self) {
        let command = ObsCommand::SetScene {
            scene: self.default_scene.clone(),
            reply: None,
        };
        if let Err(err) = self.tx.try_send(command) {
            warn!("scene trigger dropped, actuator queue unavailable: {err}");
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn default_scene(&self) -> &str {
        &self.default_scene
    }
}

/// Spawn the bridge task and return its handle.
pub fn spawn(config: ObsConfig) -> ObsHandle {
    let (tx, rx) = mpsc::channel(32);
    let handle = ObsHandle {
        tx,
        host: config.host.clone(),
        port: config.port,
        default_scene: config.default_scene.clone(),
    };
    tokio::spawn(run_bridge(config, rx));
    handle
}

async fn run_bridge(config: ObsConfig, mut rx: mpsc::Receiver<ObsCommand>) {
    let mut bridge = Bridge::new(config);
    while let Some(command) = rx.recv().await {
        match command {
            ObsCommand::Health { reply } => {
                let ok = bridge.ensure_connected().await.is_ok();
                let _ = reply.send(ok);
            }
            ObsCommand::SetScene { scene, reply } => {
                let result = bridge.set_scene(&scene).await;
                match &result {
                    Ok(()) => info!(%scene, "scene switched"),
                    Err(err) => {
                        warn!(%scene, "scene switch failed: {err}");
                        bridge.drop_connection();
                    }
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }
    }
    debug!("actuator bridge task exiting");
}

struct Bridge {
    config: ObsConfig,
    socket: Option<Socket>,
    /// Armed after a failed connect; attempts inside the window fail fast.
    retry_after: Option<Instant>,
    backoff: Duration,
}

impl Bridge {
    fn new(config: ObsConfig) -> Self {
        let backoff = config.backoff_base();
        Self {
            config,
            socket: None,
            retry_after: None,
            backoff,
        }
    }

    fn drop_connection(&mut self) {
        self.socket = None;
    }

    fn arm_backoff(&mut self) {
        self.retry_after = Some(Instant::now() + self.backoff);
        self.backoff = (self.backoff * 2).min(self.config.backoff_max());
    }

    fn reset_backoff(&mut self) {
        self.retry_after = None;
        self.backoff = self.config.backoff_base();
    }

    /// Idempotent connect: already connected is success.
    async fn ensure_connected(&mut self) -> Result<(), ObsError> {
        if self.socket.is_some() {
            return Ok(());
        }
        if let Some(after) = self.retry_after {
            if Instant::now() < after {
                return Err(ObsError::Connect("in backoff after failure".into()));
            }
        }

        match timeout(self.config.connect_timeout(), handshake(&self.config)).await {
            Err(_) => {
                self.arm_backoff();
                Err(ObsError::Timeout)
            }
            Ok(Err(err)) => {
                self.arm_backoff();
                Err(err)
            }
            Ok(Ok(socket)) => {
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    "actuator connected"
                );
                self.socket = Some(socket);
                self.reset_backoff();
                Ok(())
            }
        }
    }

    async fn set_scene(&mut self, scene: &str) -> Result<(), ObsError> {
        self.ensure_connected().await?;
        let Some(socket) = self.socket.as_mut() else {
            return Err(ObsError::Connect("no live connection".into()));
        };

        let request_id = Uuid::new_v4().to_string();
        let frame = json!({
            "op": 6,
            "d": {
                "requestType": "SetCurrentProgramScene",
                "requestId": request_id,
                "requestData": { "sceneName": scene },
            },
        });

        let deadline = self.config.request_timeout();
        timeout(deadline, request_round_trip(socket, frame, &request_id))
            .await
            .map_err(|_| ObsError::Timeout)?
    }
}

/// Dial, then run the v5 Hello/Identify/Identified exchange.
async fn handshake(config: &ObsConfig) -> Result<Socket, ObsError> {
    let url = format!("ws://{}:{}", config.host, config.port);
    let (mut socket, _response) = connect_async(url.as_str())
        .await
        .map_err(|err| ObsError::Connect(err.to_string()))?;

    let hello = read_frame(&mut socket).await?;
    if hello.op != 0 {
        return Err(ObsError::Connect(format!(
            "expected hello frame, got op {}",
            hello.op
        )));
    }
    let hello: HelloData = serde_json::from_value(hello.d)
        .map_err(|err| ObsError::Connect(format!("bad hello frame: {err}")))?;

    let authentication = hello
        .authentication
        .map(|auth| auth_string(&config.password, &auth.salt, &auth.challenge));
    let identify = json!({
        "op": 1,
        "d": {
            "rpcVersion": 1,
            "authentication": authentication,
        },
    });
    socket
        .send(Message::Text(identify.to_string()))
        .await
        .map_err(|err| ObsError::Connect(err.to_string()))?;

    let identified = read_frame(&mut socket).await?;
    if identified.op != 2 {
        return Err(ObsError::Connect(format!(
            "identify rejected, got op {}",
            identified.op
        )));
    }

    Ok(socket)
}

/// Send one request frame and wait for its matching response, skipping
/// unrelated event frames the actuator pushes in between.
async fn request_round_trip(
    socket: &mut Socket,
    frame: Value,
    request_id: &str,
) -> Result<(), ObsError> {
    socket
        .send(Message::Text(frame.to_string()))
        .await
        .map_err(|err| ObsError::Request(err.to_string()))?;

    loop {
        let frame = read_frame(socket).await?;
        if frame.op != 7 {
            continue;
        }
        let response: RequestResponseData = serde_json::from_value(frame.d)
            .map_err(|err| ObsError::Request(format!("bad response frame: {err}")))?;
        if response.request_id != request_id {
            continue;
        }
        if response.request_status.result {
            return Ok(());
        }
        return Err(ObsError::Request(
            response
                .request_status
                .comment
                .unwrap_or_else(|| format!("request rejected (code {})", response.request_status.code)),
        ));
    }
}

async fn read_frame(socket: &mut Socket) -> Result<ObsFrame, ObsError> {
    loop {
        let message = socket
            .next()
            .await
            .ok_or_else(|| ObsError::Connect("connection closed".into()))?
            .map_err(|err| ObsError::Connect(err.to_string()))?;
        match message {
            Message::Text(text) => {
                return serde_json::from_str(&text)
                    .map_err(|err| ObsError::Request(format!("bad frame: {err}")));
            }
            Message::Close(_) => {
                return Err(ObsError::Connect("connection closed".into()));
            }
            // Control frames and binary payloads are not part of the exchange.
            _ => {}
        }
    }
}

/// obs-websocket v5 challenge auth:
/// base64(sha256(base64(sha256(password + salt)) + challenge)).
fn auth_string(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

#[derive(Debug, Deserialize)]
struct ObsFrame {
    op: u8,
    d: Value,
}

#[derive(Debug, Deserialize)]
struct HelloData {
    authentication: Option<HelloAuth>,
}

#[derive(Debug, Deserialize)]
struct HelloAuth {
    challenge: String,
    salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestResponseData {
    request_id: String,
    request_status: RequestStatus,
}

#[derive(Debug, Deserialize)]
struct RequestStatus {
    result: bool,
    code: u32,
    #[serde(default)]
    comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ObsConfig {
        ObsConfig {
            host: "127.0.0.1".into(),
            // Reserved port; nothing listens there in the test environment.
            port: 9,
            password: String::new(),
            default_scene: "Scene 2".into(),
            connect_timeout_ms: 200,
            request_timeout_ms: 200,
            backoff_base_ms: 50,
            backoff_max_ms: 100,
        }
    }

    #[test]
    fn auth_string_is_deterministic() {
        let a = auth_string("secret", "salt", "challenge");
        let b = auth_string("secret", "salt", "challenge");
        assert_eq!(a, b);
        // Standard base64 of a SHA-256 digest is always 44 chars.
        assert_eq!(a.len(), 44);
        assert_ne!(a, auth_string("secret", "salt", "other-challenge"));
        assert_ne!(a, auth_string("other-secret", "salt", "challenge"));
    }

    #[test]
    fn response_frame_parses() {
        let frame: ObsFrame = serde_json::from_str(
            r#"{"op":7,"d":{"requestType":"SetCurrentProgramScene",
                "requestId":"abc","requestStatus":{"result":true,"code":100}}}"#,
        )
        .unwrap();
        assert_eq!(frame.op, 7);
        let data: RequestResponseData = serde_json::from_value(frame.d).unwrap();
        assert_eq!(data.request_id, "abc");
        assert!(data.request_status.result);
    }

    #[tokio::test]
    async fn health_is_false_when_unreachable() {
        let handle = spawn(unreachable_config());
        assert!(!handle.health().await);
    }

    #[tokio::test]
    async fn set_scene_fails_fast_when_unreachable() {
        let handle = spawn(unreachable_config());
        assert!(handle.set_scene("Scene 2").await.is_err());
    }

    #[tokio::test]
    async fn fire_default_scene_never_blocks_or_panics() {
        let handle = spawn(unreachable_config());
        for _ in 0..4 {
            handle.fire_default_scene();
        }
    }
}
