//! Program switcher interface.
//!
//! A switcher effects a scene change on the media pipeline. Two shapes can
//! implement this interface: an instantaneous A/B selector on a long-lived
//! pipeline, or a managed restart of an encoder child process. Both must keep
//! switches scene-atomic: no partial switch is ever visible downstream.

mod process;

pub use process::ProcessSwitcher;

use async_trait::async_trait;

use crate::{Result, Scene};

/// Reported pipeline liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Stopped,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }
}

/// The single interface the decision loop and the reporting API depend on.
#[async_trait]
pub trait ProgramSwitcher: Send + Sync {
    /// Put `scene` on program. Idempotent for the scene already playing.
    async fn set_scene(&self, scene: Scene) -> Result<()>;

    /// The scene currently on program, if one has been selected yet.
    async fn current_scene(&self) -> Option<Scene>;

    /// Pipeline liveness for health probing.
    async fn pipeline_state(&self) -> PipelineState;

    /// Restart the pipeline in the current scene if it died. Called on the
    /// decision cadence.
    async fn supervise(&self) -> Result<()>;

    /// Tear the pipeline down.
    async fn shutdown(&self);
}
