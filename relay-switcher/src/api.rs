//! Reporting API for the switcher process.
//!
//! Exposes the current scene, a liveness probe for the pipeline, and a
//! manual switch override for operators.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Scene;
use crate::notify::PeerNotifier;
use crate::switcher::{PipelineState, ProgramSwitcher};

/// Shared state for the reporting API.
#[derive(Clone)]
pub struct ApiState {
    pub switcher: Arc<dyn ProgramSwitcher>,
    pub notifier: Arc<PeerNotifier>,
}

#[derive(Debug, Serialize)]
struct SceneResponse {
    scene: Scene,
}

#[derive(Debug, Deserialize)]
struct SwitchParams {
    src: String,
}

/// Build the reporting router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/scene", get(get_scene))
        .route("/health", get(get_health))
        .route("/switch", get(manual_switch))
        .with_state(state)
}

async fn get_scene(State(state): State<ApiState>) -> Json<SceneResponse> {
    let scene = state
        .switcher
        .current_scene()
        .await
        .unwrap_or(Scene::Fallback);
    Json(SceneResponse { scene })
}

async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    match state.switcher.pipeline_state().await {
        PipelineState::Running => (StatusCode::OK, "ok\n".to_string()),
        state => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{}\n", state.name()),
        ),
    }
}

/// Manual operator override: `GET /switch?src=live|fallback`.
async fn manual_switch(
    State(state): State<ApiState>,
    Query(params): Query<SwitchParams>,
) -> impl IntoResponse {
    let scene: Scene = match params.src.parse() {
        Ok(scene) => scene,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("error: unknown source {:?}\n", params.src),
            );
        }
    };

    info!(scene = %scene, "manual switch requested");
    match state.switcher.set_scene(scene).await {
        Ok(()) => {
            let notifier = state.notifier.clone();
            tokio::spawn(async move { notifier.notify(scene).await });
            (StatusCode::OK, format!("switched to {scene}\n"))
        }
        Err(error) => {
            warn!(%error, "manual switch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("error: {error}\n"),
            )
        }
    }
}
