//! REST surface tests against an in-memory runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use compose_manifest::ServiceManifest;
use parking_lot::Mutex;
use tower::ServiceExt;

use relayd::api::routes::create_router;
use relayd::api::server::AppState;
use relayd::runtime::{
    ComposeCli, ContainerDetails, ContainerRuntime, HealthState, Lifecycle,
};
use relayd::scene::SceneStateCell;
use relayd::services::ServiceController;

struct FakeRuntime {
    containers: Mutex<HashMap<String, ContainerDetails>>,
}

impl FakeRuntime {
    fn new() -> Self {
        let mut containers = HashMap::new();
        containers.insert(
            "relayer-nginx-rtmp".to_string(),
            ContainerDetails {
                short_id: "0123456789ab".to_string(),
                lifecycle: Lifecycle::Running,
                health: Some(HealthState::Healthy),
                started_at: Some(Utc::now() - chrono::Duration::seconds(120)),
                finished_at: None,
                exit_code: None,
            },
        );
        Self {
            containers: Mutex::new(containers),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_all(&self) -> relayd::Result<Vec<String>> {
        Ok(self.containers.lock().keys().cloned().collect())
    }

    async fn inspect(&self, name: &str) -> relayd::Result<Option<ContainerDetails>> {
        Ok(self.containers.lock().get(name).cloned())
    }

    async fn logs_tail(&self, name: &str, _tail: usize) -> relayd::Result<Option<Vec<u8>>> {
        if !self.containers.lock().contains_key(name) {
            return Ok(None);
        }
        Ok(Some(
            b"2026-07-31T12:00:00Z listening\n2026-07-31T12:00:01Z ready\n".to_vec(),
        ))
    }

    async fn start(&self, _name: &str) -> relayd::Result<()> {
        Ok(())
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    _dir: tempfile::TempDir,
}

fn app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let manifest = ServiceManifest::parse(
        "services:\n  nginx-rtmp: {}\n  stream-switcher: {}\n",
        "relayer",
    )
    .unwrap();
    let controller = Arc::new(ServiceController::new(
        manifest,
        Arc::new(FakeRuntime::new()),
        ComposeCli::new(dir.path().join("docker-compose.yml")),
    ));
    let scene = Arc::new(SceneStateCell::load(dir.path().join("privacy_mode.json")));
    let cancel = tokio_util::sync::CancellationToken::new();
    let hub = relayd::fanout::spawn(controller.clone(), scene.clone(), cancel.child_token());

    let observer_hub = hub.clone();
    scene.on_change(move |event| observer_hub.post_state_event(*event));

    let state = AppState {
        controller,
        scene,
        hub,
    };
    TestApp {
        router: create_router(state.clone()),
        state,
        _dir: dir,
    }
}

async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

async fn post(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::post(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let app = app();
    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn containers_merges_manifest_and_runtime() {
    let app = app();
    let (status, body) = get(&app.router, "/containers").await;
    assert_eq!(status, StatusCode::OK);

    let containers = body["containers"].as_array().unwrap();
    assert_eq!(containers.len(), 2);
    assert!(body.get("warning").is_none());

    let nginx = containers
        .iter()
        .find(|c| c["name"] == "nginx-rtmp")
        .unwrap();
    assert_eq!(nginx["status"], "running");
    assert_eq!(nginx["health"], "healthy");
    assert_eq!(nginx["running"], true);
    assert!(
        nginx["status_detail"]
            .as_str()
            .unwrap()
            .starts_with("Up 2 minutes")
    );

    let switcher = containers
        .iter()
        .find(|c| c["name"] == "stream-switcher")
        .unwrap();
    assert_eq!(switcher["status"], "not-created");
    assert_eq!(switcher["created"], false);
}

#[tokio::test]
async fn status_and_logs_for_one_service() {
    let app = app();

    let (status, body) = get(&app.router, "/container/nginx-rtmp/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["id"], "0123456789ab");

    let (status, body) = get(&app.router, "/container/nginx-rtmp/logs?tail=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["container"], "nginx-rtmp");

    let (status, body) = get(&app.router, "/container/stream-switcher/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("stream-switcher"));
}

#[tokio::test]
async fn lifecycle_posts_return_accepted_acks() {
    let app = app();

    let (status, body) = post(&app.router, "/container/nginx-rtmp/start").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "starting");
    assert_eq!(body["container"], "nginx-rtmp");

    let (status, body) = post(&app.router, "/container/nginx-rtmp/stop").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "stopping");

    let (status, _) = post(&app.router, "/container/nginx-rtmp/restart").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = post(&app.router, "/container/nginx-rtmp/create-and-start").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = post(&app.router, "/container/ghost/start").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scene_round_trip() {
    let app = app();

    let (status, body) = get(&app.router, "/scene").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_scene"], "FALLBACK");

    let (status, body) = post(&app.router, "/scene/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (_, body) = get(&app.router, "/scene").await;
    assert_eq!(body["current_scene"], "LIVE");

    // Idempotent repeat.
    let (status, body) = post(&app.router, "/scene/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], false);

    let (status, _) = post(&app.router, "/scene/purple").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn privacy_round_trip_persists() {
    let app = app();

    let (status, body) = get(&app.router, "/privacy").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["privacy_enabled"], false);

    let (status, body) = post(&app.router, "/privacy/enable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert!(app.state.scene.privacy_enabled());

    let (_, body) = get(&app.router, "/privacy").await;
    assert_eq!(body["privacy_enabled"], true);

    let (_, body) = post(&app.router, "/privacy/disable").await;
    assert_eq!(body["changed"], true);
    let (_, body) = post(&app.router, "/privacy/enable").await;
    assert_eq!(body["changed"], true);

    // enable -> disable -> enable leaves true on disk.
    let raw = std::fs::read_to_string(app._dir.path().join("privacy_mode.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["enabled"], true);

    let (status, _) = post(&app.router, "/privacy/maybe").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn combined_state_endpoint() {
    let app = app();
    post(&app.router, "/scene/live").await;
    post(&app.router, "/privacy/enable").await;

    let (status, body) = get(&app.router, "/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_scene"], "LIVE");
    assert_eq!(body["privacy_enabled"], true);
    assert!(body["scene_timestamp"].is_string());
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let app = app();
    let (status, body) = get(&app.router, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}
