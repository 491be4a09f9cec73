//! Shared scene and privacy state.
//!
//! One mutable cell, shared by the REST surface, the fan-out hub, and the
//! switcher's peer notifications. All mutation goes through accessors that
//! hold the mutex for the mutation (including the privacy persistence side
//! effect) and release it before invoking registered observers. Observers
//! must only enqueue work on their own side.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// The selected program source at a given moment. The program is always in
/// exactly one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scene {
    Live,
    Fallback,
}

impl Scene {
    pub fn as_path_segment(&self) -> &'static str {
        match self {
            Scene::Live => "live",
            Scene::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path_segment())
    }
}

#[derive(Debug, Error)]
#[error("unknown scene: {0}")]
pub struct ParseSceneError(String);

impl FromStr for Scene {
    type Err = ParseSceneError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Scene::Live),
            "fallback" => Ok(Scene::Fallback),
            other => Err(ParseSceneError(other.to_string())),
        }
    }
}

/// Point-in-time copy of the cell.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateSnapshot {
    pub current_scene: Scene,
    pub scene_timestamp: DateTime<Utc>,
    pub privacy_enabled: bool,
}

/// Event handed to observers after a non-idempotent mutation.
#[derive(Debug, Clone, Copy)]
pub enum StateEvent {
    SceneChanged {
        previous: Scene,
        current: Scene,
        at: DateTime<Utc>,
    },
    PrivacyChanged {
        enabled: bool,
        at: DateTime<Utc>,
    },
}

/// On-disk privacy mode record.
#[derive(Debug, Serialize, Deserialize)]
struct PrivacyFile {
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

struct CellState {
    scene: Scene,
    scene_changed_at: DateTime<Utc>,
    privacy_enabled: bool,
}

type Observer = Box<dyn Fn(&StateEvent) + Send + Sync>;

/// Process-wide scene/privacy cell.
pub struct SceneStateCell {
    state: Mutex<CellState>,
    observers: RwLock<Vec<Observer>>,
    privacy_path: PathBuf,
}

impl SceneStateCell {
    /// Create the cell, reading persisted privacy state once. A missing file
    /// means privacy is disabled.
    pub fn load(privacy_path: impl Into<PathBuf>) -> Self {
        let privacy_path = privacy_path.into();
        let privacy_enabled = read_privacy_file(&privacy_path);
        info!(
            privacy = privacy_enabled,
            path = %privacy_path.display(),
            "scene state initialized"
        );

        Self {
            state: Mutex::new(CellState {
                scene: Scene::Fallback,
                scene_changed_at: Utc::now(),
                privacy_enabled,
            }),
            observers: RwLock::new(Vec::new()),
            privacy_path,
        }
    }

    /// Register an observer for scene and privacy changes.
    pub fn on_change(&self, observer: impl Fn(&StateEvent) + Send + Sync + 'static) {
        self.observers.write().push(Box::new(observer));
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock();
        StateSnapshot {
            current_scene: state.scene,
            scene_timestamp: state.scene_changed_at,
            privacy_enabled: state.privacy_enabled,
        }
    }

    pub fn current_scene(&self) -> Scene {
        self.state.lock().scene
    }

    pub fn privacy_enabled(&self) -> bool {
        self.state.lock().privacy_enabled
    }

    /// Record an external scene transition. Returns whether anything changed.
    pub fn set_scene(&self, scene: Scene) -> bool {
        let event = {
            let mut state = self.state.lock();
            if state.scene == scene {
                return false;
            }
            let previous = state.scene;
            let at = Utc::now();
            state.scene = scene;
            state.scene_changed_at = at;
            info!(previous = %previous, current = %scene, "scene changed");
            StateEvent::SceneChanged {
                previous,
                current: scene,
                at,
            }
        };

        self.notify(&event);
        true
    }

    pub fn enable_privacy(&self) -> bool {
        self.set_privacy(true)
    }

    pub fn disable_privacy(&self) -> bool {
        self.set_privacy(false)
    }

    fn set_privacy(&self, enabled: bool) -> bool {
        let event = {
            let mut state = self.state.lock();
            if state.privacy_enabled == enabled {
                return false;
            }
            state.privacy_enabled = enabled;
            let at = Utc::now();
            info!(enabled, "privacy mode changed");
            write_privacy_file(&self.privacy_path, enabled, at);
            StateEvent::PrivacyChanged { enabled, at }
        };

        self.notify(&event);
        true
    }

    fn notify(&self, event: &StateEvent) {
        for observer in self.observers.read().iter() {
            observer(event);
        }
    }
}

fn read_privacy_file(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<PrivacyFile>(&raw) {
            Ok(file) => file.enabled,
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable privacy file, assuming disabled");
                false
            }
        },
        Err(_) => false,
    }
}

fn write_privacy_file(path: &Path, enabled: bool, at: DateTime<Utc>) {
    let file = PrivacyFile {
        enabled,
        updated_at: Some(at),
    };

    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&file).unwrap_or_default();
        std::fs::write(path, raw)
    };

    if let Err(error) = write() {
        warn!(path = %path.display(), %error, "failed to persist privacy state");
    }
}
