//! REST surface: session lifecycle, event submission, actuator control.
//!
//! Handlers only translate between wire shapes and the engine contract;
//! everything consistency-related lives in the engine.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};

use super::engine::{Engine, EngineError};
use super::obs::ObsHandle;
use super::ws;

/// How many sessions the operational listing returns.
const SESSION_LIST_LIMIT: u32 = 50;

pub struct AppState {
    pub engine: Engine,
    pub obs: ObsHandle,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    // The devices are embedded web clients scattered around the venue's
    // network; the surface is fully cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/events", post(submit_event))
        .route("/obs/health", get(obs_health))
        .route("/obs/scene", post(obs_scene))
        .route("/obs/scene2", post(obs_scene_default))
        .route("/ws", get(ws::upgrade))
        .layer(cors)
        .with_state(state)
}

/// Engine errors mapped onto the wire: 404 for unknown sessions, 400 for
/// rejected events, 500 for storage trouble.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::MissingEventKind | EngineError::InvalidEvent(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
}

async fn create_session(
    State(state): State<SharedState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<Value>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let (session_id, doc) = state.engine.create_session(request.session_id)?;
    Ok(Json(json!({ "session_id": session_id, "state": doc })))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.engine.get_state(&id)? {
        Some(doc) => Ok(Json(json!({ "session_id": id, "state": doc }))),
        None => Err(ApiError::from(EngineError::SessionNotFound {
            session_id: id,
        })),
    }
}

async fn list_sessions(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let sessions = state.engine.list_sessions(SESSION_LIST_LIMIT)?;
    Ok(Json(json!({ "sessions": sessions })))
}

#[derive(Debug, Deserialize)]
struct SubmitEventRequest {
    #[serde(default, alias = "type")]
    kind: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

async fn submit_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitEventRequest>,
) -> Result<Json<Value>, ApiError> {
    let payload = request.payload.unwrap_or_else(|| json!({}));
    let doc = state
        .engine
        .submit_event(&id, request.kind.as_deref(), payload)
        .await?;
    Ok(Json(json!({ "ok": true, "state": doc })))
}

async fn obs_health(State(state): State<SharedState>) -> Json<Value> {
    let connected = state.obs.health().await;
    Json(json!({
        "ok": connected,
        "connected": connected,
        "host": state.obs.host(),
        "port": state.obs.port(),
    }))
}

#[derive(Debug, Deserialize)]
struct SceneRequest {
    #[serde(default, alias = "sceneName")]
    scene_name: Option<String>,
}

async fn obs_scene(
    State(state): State<SharedState>,
    Json(request): Json<SceneRequest>,
) -> Response {
    let Some(scene) = request.scene_name else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "scene_name required" })),
        )
            .into_response();
    };
    switch_scene(&state, scene).await
}

async fn obs_scene_default(State(state): State<SharedState>) -> Response {
    let scene = state.obs.default_scene().to_string();
    switch_scene(&state, scene).await
}

async fn switch_scene(state: &AppState, scene: String) -> Response {
    match state.obs.set_scene(scene.clone()).await {
        Ok(()) => Json(json!({ "ok": true, "scene_name": scene })).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "ok": false, "error": err.to_string() })),
        )
            .into_response(),
    }
}
