//! Container runtime abstraction.
//!
//! The controller is typed against this trait rather than the Docker client
//! directly; tests substitute an in-memory runtime. Compose-level batch
//! operations live in [`compose::ComposeCli`].

pub mod compose;
pub mod docker;

pub use compose::{ComposeCli, ComposeOutput};
pub use docker::DockerRuntime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Result;

/// Reported lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    /// Declared in the manifest, no runtime container exists.
    NotCreated,
    Created,
    Running,
    Exited,
    Paused,
    Restarting,
    Unknown,
}

impl Lifecycle {
    /// Capitalised word used as the fallback detail string.
    pub fn capitalized(&self) -> &'static str {
        match self {
            Lifecycle::NotCreated => "Not created",
            Lifecycle::Created => "Created",
            Lifecycle::Running => "Running",
            Lifecycle::Exited => "Exited",
            Lifecycle::Paused => "Paused",
            Lifecycle::Restarting => "Restarting",
            Lifecycle::Unknown => "Unknown",
        }
    }
}

/// Health check verdict for a running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Starting,
}

/// Inspection result for one container.
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub short_id: String,
    pub lifecycle: Lifecycle,
    /// Present only when the container declares a health check and is running.
    pub health: Option<HealthState>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
}

/// The operations the control plane requires of the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Names of all containers, running or not.
    async fn list_all(&self) -> Result<Vec<String>>;

    /// Inspect one container. `None` when it does not exist.
    async fn inspect(&self, name: &str) -> Result<Option<ContainerDetails>>;

    /// Tail of the container log, timestamps included. `None` when the
    /// container does not exist.
    async fn logs_tail(&self, name: &str, tail: usize) -> Result<Option<Vec<u8>>>;

    /// Start an existing container.
    async fn start(&self, name: &str) -> Result<()>;
}
