//! Route handlers for the request/response surface.

use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::scene::Scene;
use crate::services::{OpAck, ServiceList, ServiceLogs, ServiceStatus};

/// Default log tail for the REST surface.
const DEFAULT_LOG_TAIL: usize = 500;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/containers", get(list_containers))
        .route("/container/{name}/status", get(container_status))
        .route("/container/{name}/logs", get(container_logs))
        .route("/container/{name}/start", post(container_start))
        .route("/container/{name}/stop", post(container_stop))
        .route("/container/{name}/restart", post(container_restart))
        .route(
            "/container/{name}/create-and-start",
            post(container_create_and_start),
        )
        .route("/scene", get(get_scene))
        .route("/scene/{scene}", post(post_scene))
        .route("/privacy", get(get_privacy))
        .route("/privacy/{action}", post(post_privacy))
        .route("/state", get(get_state))
        .route("/ws", get(subscribe_ws))
        .fallback(unknown_route)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok\n"
}

async fn unknown_route() -> ApiError {
    ApiError::not_found("Not found")
}

async fn list_containers(State(state): State<AppState>) -> Json<ServiceList> {
    Json(state.controller.list_services().await)
}

async fn container_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServiceStatus>> {
    let status = state.controller.status(&name).await?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct LogsParams {
    tail: Option<usize>,
}

async fn container_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<LogsParams>,
) -> ApiResult<Json<ServiceLogs>> {
    let tail = params.tail.unwrap_or(DEFAULT_LOG_TAIL);
    let logs = state.controller.logs(&name, tail).await?;
    Ok(Json(logs))
}

async fn container_start(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<OpAck>)> {
    let ack = state.controller.clone().start(&name)?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn container_stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<OpAck>)> {
    let ack = state.controller.clone().stop(&name)?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn container_restart(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<OpAck>)> {
    let ack = state.controller.clone().restart(&name)?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn container_create_and_start(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<OpAck>)> {
    let ack = state.controller.clone().create_and_start(&name)?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn get_scene(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.scene.snapshot();
    Json(json!({
        "current_scene": snapshot.current_scene,
        "scene_timestamp": snapshot.scene_timestamp,
    }))
}

/// Scene transition recorded by the switcher peer.
async fn post_scene(
    State(state): State<AppState>,
    Path(scene): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let scene: Scene = scene
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid scene: {scene}")))?;

    info!(scene = %scene, "scene notification received");
    let changed = state.scene.set_scene(scene);
    Ok(Json(json!({
        "status": "ok",
        "scene": scene,
        "changed": changed,
    })))
}

async fn get_privacy(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "privacy_enabled": state.scene.privacy_enabled() }))
}

async fn post_privacy(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let (enabled, changed) = match action.as_str() {
        "enable" => (true, state.scene.enable_privacy()),
        "disable" => (false, state.scene.disable_privacy()),
        other => {
            return Err(ApiError::bad_request(format!(
                "Invalid privacy action: {other}"
            )));
        }
    };

    Ok(Json(json!({
        "status": "ok",
        "privacy_enabled": enabled,
        "changed": changed,
    })))
}

async fn get_state(State(state): State<AppState>) -> Json<crate::scene::StateSnapshot> {
    Json(state.scene.snapshot())
}

/// Upgrade to the subscription surface.
async fn subscribe_ws(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    upgrade.on_upgrade(move |socket| async move { hub.handle_socket(socket).await })
}
