//! relayd - RTMP relay control plane
//!
//! Owns the managed service fleet, the shared scene/privacy state, and the
//! operator dashboard surfaces (REST + WebSocket fan-out).

use std::sync::Arc;

use compose_manifest::ServiceManifest;
use relayd::api::{ApiServer, AppState};
use relayd::config::ControllerSettings;
use relayd::logging::init_logging;
use relayd::runtime::{ComposeCli, ContainerRuntime, DockerRuntime};
use relayd::scene::SceneStateCell;
use relayd::services::ServiceController;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ControllerSettings::from_env_or_default();
    let _guard = init_logging(settings.log_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    info!("Starting relayd v{}", env!("CARGO_PKG_VERSION"));
    info!(
        manifest = %settings.manifest_path.display(),
        project = %settings.project_name,
        socket = %settings.runtime_socket,
        "configuration loaded"
    );

    let manifest = match ServiceManifest::load(&settings.manifest_path, &settings.project_name) {
        Ok(manifest) => {
            info!(services = manifest.len(), "manifest loaded");
            manifest
        }
        Err(error) => {
            warn!(%error, "failed to load manifest, continuing with no declared services");
            ServiceManifest::empty(&settings.project_name)
        }
    };

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRuntime::connect(&settings.runtime_socket)?);
    let compose = ComposeCli::new(settings.manifest_path.clone());
    let controller = Arc::new(ServiceController::new(manifest, runtime, compose));
    let scene = Arc::new(SceneStateCell::load(settings.privacy_mode_file.clone()));

    let cancel = CancellationToken::new();
    let hub = relayd::fanout::spawn(controller.clone(), scene.clone(), cancel.child_token());

    // Scene/privacy mutations happen on whichever task serves the request;
    // the observer only enqueues the broadcast on the hub loop.
    let observer_hub = hub.clone();
    scene.on_change(move |event| observer_hub.post_state_event(*event));

    let state = AppState {
        controller,
        scene,
        hub,
    };
    let server = ApiServer::new(settings.api.clone(), state, cancel.child_token());

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, initiating shutdown...");
            }
            _ = wait_for_sigterm() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
        signal_cancel.cancel();
    });

    server.run().await?;

    cancel.cancel();
    info!("relayd shutdown complete");
    Ok(())
}

/// Wait for SIGTERM (Unix only).
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("failed to register SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
