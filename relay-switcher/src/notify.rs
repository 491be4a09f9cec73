//! Peer scene notification.
//!
//! After a successful switch the fan-out server is told about the new scene
//! with a bodyless POST. The call is best-effort: failures are logged and
//! never fail the switch.

use std::time::Duration;

use tracing::{debug, warn};

use crate::Scene;

/// Timeout for one notification attempt.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort notifier for the fan-out server.
#[derive(Debug, Clone)]
pub struct PeerNotifier {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl PeerNotifier {
    pub fn new(base_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .unwrap_or_else(|error| {
                warn!(%error, "failed to build notify client, using defaults");
                reqwest::Client::new()
            });

        Self { http, base_url }
    }

    /// POST `<peer>/scene/<scene>`. No-op when no peer is configured.
    pub async fn notify(&self, scene: Scene) {
        let Some(base) = &self.base_url else {
            return;
        };
        let url = format!(
            "{}/scene/{}",
            base.trim_end_matches('/'),
            scene.as_path_segment()
        );

        match self.http.post(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(scene = %scene, "peer notified");
            }
            Ok(response) => {
                warn!(scene = %scene, status = %response.status(), "peer notify rejected");
            }
            Err(error) => {
                warn!(scene = %scene, %error, "peer notify failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_peer_url_notify_is_a_noop() {
        let notifier = PeerNotifier::new(None);
        // Must not attempt any network call.
        notifier.notify(Scene::Live).await;
    }
}
