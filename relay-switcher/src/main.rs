//! relay-switcher - RTMP relay program switcher
//!
//! Watches the RTMP statistics endpoint and keeps either the live camera
//! ingest or the looping offline source on program, restarting the encoder
//! child on every scene change.

use std::net::SocketAddr;
use std::sync::Arc;

use relay_switcher::api::{self, ApiState};
use relay_switcher::config::SwitcherSettings;
use relay_switcher::logging::init_logging;
use relay_switcher::notify::PeerNotifier;
use relay_switcher::switcher::{ProcessSwitcher, ProgramSwitcher};
use relay_switcher::driver;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging().map_err(|e| anyhow::anyhow!("{e}"))?;

    info!("Starting relay-switcher v{}", env!("CARGO_PKG_VERSION"));

    let settings = SwitcherSettings::from_env_or_default();
    info!(
        stats_url = %settings.probe.stats_url,
        app = %settings.probe.app_name,
        stream = %settings.probe.stream_name,
        poll_ms = settings.decider.poll_interval.as_millis() as u64,
        min_bitrate_kbps = settings.decider.min_bitrate_kbps,
        "probe configured"
    );
    if settings.peer_notify_url.is_none() {
        warn!("PEER_SCENE_NOTIFY_URL not set, scene changes will not reach the dashboard");
    }

    let switcher: Arc<dyn ProgramSwitcher> =
        Arc::new(ProcessSwitcher::new(settings.encoder.clone()));
    let notifier = Arc::new(PeerNotifier::new(settings.peer_notify_url.clone()));
    let cancel = CancellationToken::new();

    // Decision loop on its own task.
    let loop_switcher = switcher.clone();
    let loop_notifier = notifier.clone();
    let loop_cancel = cancel.child_token();
    let probe_config = settings.probe.clone();
    let decider_config = settings.decider;
    tokio::spawn(async move {
        if let Err(e) = driver::run(
            probe_config,
            decider_config,
            loop_switcher,
            loop_notifier,
            loop_cancel,
        )
        .await
        {
            error!("decision loop error: {e}");
        }
    });

    // Reporting API.
    let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.port).parse()?;
    let router = api::router(ApiState {
        switcher: switcher.clone(),
        notifier,
    });
    let listener = TcpListener::bind(addr).await?;
    info!("reporting API listening on http://{addr}");

    let serve_cancel = cancel.child_token();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, initiating shutdown...");
                }
                _ = wait_for_sigterm() => {
                    info!("Received SIGTERM, initiating shutdown...");
                }
                _ = serve_cancel.cancelled() => {}
            }
        })
        .await?;

    cancel.cancel();
    info!("stopping encoder...");
    switcher.shutdown().await;
    info!("relay-switcher shutdown complete");
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
