//! Compose-level batch operations.
//!
//! Materialising a service from the manifest (and removing one) goes through
//! the `docker compose` CLI, which owns dependency resolution and network
//! setup. Every invocation runs under an outer timeout; stderr is captured
//! for the recreation heuristic.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Outer timeout for one compose invocation.
const COMPOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Stop/restart grace period handed to compose, in seconds.
const STOP_TIMEOUT_SECS: u32 = 30;

/// Captured result of a compose invocation.
#[derive(Debug)]
pub struct ComposeOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Thin wrapper over the `docker compose` CLI for one project.
#[derive(Debug, Clone)]
pub struct ComposeCli {
    project_dir: PathBuf,
    compose_file: PathBuf,
    env_file: PathBuf,
}

impl ComposeCli {
    pub fn new(compose_file: impl Into<PathBuf>) -> Self {
        let compose_file = compose_file.into();
        let project_dir = compose_file
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let env_file = project_dir.join(".env");

        Self {
            project_dir,
            compose_file,
            env_file,
        }
    }

    /// `up -d --remove-orphans [--no-deps] <service>` — materialise a service
    /// from the manifest. `no_deps` keeps manual-profile services from
    /// cascading into their dependencies.
    pub async fn up(&self, service: &str, no_deps: bool) -> Result<ComposeOutput> {
        let mut args = vec!["up", "-d", "--remove-orphans"];
        if no_deps {
            args.push("--no-deps");
        }
        args.push(service);
        self.run(&args).await
    }

    /// `rm -f -s <service>` — stop and remove a service's container.
    pub async fn rm(&self, service: &str) -> Result<ComposeOutput> {
        self.run(&["rm", "-f", "-s", service]).await
    }

    pub async fn start(&self, service: &str) -> Result<ComposeOutput> {
        self.run(&["start", service]).await
    }

    pub async fn stop(&self, service: &str) -> Result<ComposeOutput> {
        let timeout = STOP_TIMEOUT_SECS.to_string();
        self.run(&["stop", "-t", timeout.as_str(), service]).await
    }

    pub async fn restart(&self, service: &str) -> Result<ComposeOutput> {
        let timeout = STOP_TIMEOUT_SECS.to_string();
        self.run(&["restart", "-t", timeout.as_str(), service])
            .await
    }

    async fn run(&self, args: &[&str]) -> Result<ComposeOutput> {
        let mut cmd = Command::new("docker");
        cmd.arg("compose")
            .arg("--project-directory")
            .arg(&self.project_dir)
            .arg("-f")
            .arg(&self.compose_file);
        if self.env_file.exists() {
            cmd.arg("--env-file").arg(&self.env_file);
        }
        cmd.args(args);
        cmd.stdin(Stdio::null());

        debug!(?args, "running docker compose");
        let output = tokio::time::timeout(COMPOSE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| Error::compose(format!("timed out: docker compose {}", args.join(" "))))?
            .map_err(|e| Error::compose(format!("failed to run docker compose: {e}")))?;

        Ok(ComposeOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
