//! The decision loop: probe → decide → switch.
//!
//! Runs on a fixed cadence. A probe failure is data, not an exception: it is
//! fed to the decider as an absent sample and the loop continues.

use std::sync::Arc;
use std::time::Instant;

use rtmp_stats::{StatsClient, StreamSample};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DeciderConfig, ProbeConfig};
use crate::decider::SceneDecider;
use crate::notify::PeerNotifier;
use crate::switcher::ProgramSwitcher;
use crate::{Result, Scene};

/// Run the decision loop until cancelled.
pub async fn run(
    probe_config: ProbeConfig,
    decider_config: DeciderConfig,
    switcher: Arc<dyn ProgramSwitcher>,
    notifier: Arc<PeerNotifier>,
    cancel: CancellationToken,
) -> Result<()> {
    let probe = StatsClient::new(
        probe_config.stats_url.clone(),
        probe_config.app_name.clone(),
        probe_config.stream_name.clone(),
    )?;

    let (mut decider, initial) = SceneDecider::new(decider_config, Instant::now());
    info!(scene = %initial, "setting initial scene");
    apply_scene(initial, &switcher, &notifier).await;

    let mut ticker = tokio::time::interval(decider_config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("decision loop shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(e) = switcher.supervise().await {
                    warn!("failed to restart encoder: {e}");
                }

                let sample = match probe.sample().await {
                    Ok(sample) => sample,
                    Err(e) => {
                        warn!("stat fetch failed: {e}");
                        StreamSample::absent()
                    }
                };

                if let Some(scene) = decider.observe(&sample, Instant::now()) {
                    info!(
                        scene = %scene,
                        bitrate_kbps = sample.bitrate_kbps(),
                        exists = sample.exists,
                        "switching program"
                    );
                    apply_scene(scene, &switcher, &notifier).await;
                }
            }
        }
    }
}

/// Effect a scene command and notify the peer. The notification runs on its
/// own task so a slow peer never delays the poll cadence.
async fn apply_scene(
    scene: Scene,
    switcher: &Arc<dyn ProgramSwitcher>,
    notifier: &Arc<PeerNotifier>,
) {
    match switcher.set_scene(scene).await {
        Ok(()) => {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.notify(scene).await });
        }
        Err(e) => error!(scene = %scene, "scene switch failed: {e}"),
    }
}
