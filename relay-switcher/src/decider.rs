//! Hysteretic scene decision state machine.
//!
//! Maps a sequence of [`StreamSample`] observations to scene switch commands.
//! Two dwell timers guard the transitions: a currently-live program must see
//! consecutively-unhealthy samples for `miss_timeout` before falling back,
//! and a fallback program must see consecutively-healthy samples for
//! `back_stability` before promoting. Commands are emitted only on true
//! transitions; the emitted sequence never contains two consecutive
//! identical scenes.

use std::time::Instant;

use rtmp_stats::StreamSample;

use crate::Scene;
use crate::config::DeciderConfig;

/// The decision state machine. All time arithmetic is monotonic.
#[derive(Debug)]
pub struct SceneDecider {
    config: DeciderConfig,
    active_scene: Scene,
    /// Most recent healthy sample.
    last_healthy: Instant,
    /// Start of the current run of healthy samples, while on FALLBACK.
    stable_since: Option<Instant>,
}

impl SceneDecider {
    /// Create the decider and return its unconditional initial command.
    ///
    /// The initial `SWITCH(FALLBACK)` puts the downstream pipeline into a
    /// known state before any sample is taken.
    pub fn new(config: DeciderConfig, now: Instant) -> (Self, Scene) {
        let decider = Self {
            config,
            active_scene: Scene::Fallback,
            last_healthy: now,
            stable_since: None,
        };
        (decider, Scene::Fallback)
    }

    /// The scene the decider currently believes is on program.
    pub fn active_scene(&self) -> Scene {
        self.active_scene
    }

    /// Feed one sample; returns a switch command on a true transition.
    ///
    /// A sample landing exactly on a timer boundary fires the transition.
    pub fn observe(&mut self, sample: &StreamSample, now: Instant) -> Option<Scene> {
        let healthy = sample.is_healthy(self.config.min_bitrate_kbps);

        match (self.active_scene, healthy) {
            (Scene::Fallback, true) => {
                let stable_since = *self.stable_since.get_or_insert(now);
                self.last_healthy = now;
                if now.duration_since(stable_since) >= self.config.back_stability {
                    self.active_scene = Scene::Live;
                    self.stable_since = None;
                    Some(Scene::Live)
                } else {
                    None
                }
            }
            (Scene::Fallback, false) => {
                self.stable_since = None;
                None
            }
            (Scene::Live, true) => {
                self.last_healthy = now;
                self.stable_since = None;
                None
            }
            (Scene::Live, false) => {
                if now.duration_since(self.last_healthy) >= self.config.miss_timeout {
                    self.active_scene = Scene::Fallback;
                    Some(Scene::Fallback)
                } else {
                    None
                }
            }
        }
    }
}
