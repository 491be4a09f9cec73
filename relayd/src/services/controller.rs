//! Service lifecycle, status and log access for the managed fleet.
//!
//! Lifecycle operations are acknowledged immediately; the runtime work runs
//! on a background task whose failures are logged and observable only via
//! subsequent status polls.

use std::sync::Arc;

use chrono::Utc;
use compose_manifest::{ServiceDescriptor, ServiceManifest};
use serde::Serialize;
use tracing::{info, warn};

use crate::runtime::{ComposeCli, ContainerRuntime, Lifecycle};
use crate::services::status::ServiceStatus;
use crate::{Error, Result};

/// Error phrase sets indicating stale network or overlay state from a
/// previous cycle. The manifest is authoritative, so a container whose start
/// fails this way is removed and re-materialised rather than retried.
const RECREATION_PATTERNS: &[&[&str]] = &[
    &["network", "not found"],
    &["failed to set up container networking"],
    &["error response from daemon", "network"],
    &["error mounting"],
    &["failed to create task for container"],
    &["error during container init"],
    &["not a directory", "mount"],
    &["are you trying to mount a directory onto a file"],
    &["oci runtime create failed"],
    &["unable to start container process"],
];

/// Merged view of the declared fleet.
#[derive(Debug, Serialize)]
pub struct ServiceList {
    pub containers: Vec<ServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Tail of one service's log.
#[derive(Debug, Serialize)]
pub struct ServiceLogs {
    pub container: String,
    pub logs: Vec<String>,
    pub count: usize,
}

/// Immediate acknowledgement of an asynchronous lifecycle operation.
#[derive(Debug, Serialize)]
pub struct OpAck {
    pub status: &'static str,
    pub container: String,
    pub message: String,
}

impl OpAck {
    fn new(status: &'static str, container: &str, verb: &str) -> Self {
        Self {
            status,
            container: container.to_string(),
            message: format!("Container {container} is {verb}"),
        }
    }
}

/// Owns the managed container fleet.
pub struct ServiceController {
    manifest: ServiceManifest,
    runtime: Arc<dyn ContainerRuntime>,
    compose: ComposeCli,
}

impl ServiceController {
    pub fn new(
        manifest: ServiceManifest,
        runtime: Arc<dyn ContainerRuntime>,
        compose: ComposeCli,
    ) -> Self {
        Self {
            manifest,
            runtime,
            compose,
        }
    }

    pub fn manifest(&self) -> &ServiceManifest {
        &self.manifest
    }

    /// Merge the declared manifest with the runtime list. Every declared
    /// service is present in the output; runtime failures degrade to
    /// `unknown` entries plus a warning flag and never raise.
    pub async fn list_services(&self) -> ServiceList {
        let names = match self.runtime.list_all().await {
            Ok(names) => names,
            Err(error) => {
                warn!(%error, "runtime list failed, degrading to unknown");
                return ServiceList {
                    containers: self
                        .manifest
                        .services()
                        .iter()
                        .map(ServiceStatus::unknown)
                        .collect(),
                    warning: Some("Runtime unavailable - showing incomplete data".to_string()),
                };
            }
        };

        let mut warning = None;
        let mut containers = Vec::with_capacity(self.manifest.len());
        for descriptor in self.manifest.services() {
            if !names.iter().any(|n| n == &descriptor.runtime_name) {
                containers.push(ServiceStatus::not_created(descriptor));
                continue;
            }

            match self.runtime.inspect(&descriptor.runtime_name).await {
                Ok(Some(details)) => {
                    containers.push(ServiceStatus::from_details(descriptor, &details, Utc::now()));
                }
                // Disappeared between list and inspect.
                Ok(None) => containers.push(ServiceStatus::not_created(descriptor)),
                Err(error) => {
                    warn!(service = %descriptor.short_name, %error, "inspect failed");
                    warning =
                        Some("Runtime unavailable - showing incomplete data".to_string());
                    containers.push(ServiceStatus::unknown(descriptor));
                }
            }
        }

        ServiceList {
            containers,
            warning,
        }
    }

    /// Status of one service. Unlike `list_services`, a service whose
    /// container does not exist raises `ServiceNotFound`.
    pub async fn status(&self, short_name: &str) -> Result<ServiceStatus> {
        let descriptor = self.descriptor_for(short_name);
        let details = self
            .runtime
            .inspect(&descriptor.runtime_name)
            .await?
            .ok_or_else(|| Error::service_not_found(short_name))?;
        Ok(ServiceStatus::from_details(
            &descriptor,
            &details,
            Utc::now(),
        ))
    }

    /// Tail of one service's log, split into non-empty lines.
    pub async fn logs(&self, short_name: &str, tail: usize) -> Result<ServiceLogs> {
        let runtime_name = self.manifest.runtime_name(short_name);
        let bytes = self
            .runtime
            .logs_tail(&runtime_name, tail)
            .await?
            .ok_or_else(|| Error::service_not_found(short_name))?;

        let text = String::from_utf8_lossy(&bytes);
        let logs: Vec<String> = text
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        let count = logs.len();

        Ok(ServiceLogs {
            container: short_name.to_string(),
            logs,
            count,
        })
    }

    /// Start a service. Returns immediately; the runtime operation runs in
    /// the background.
    pub fn start(self: Arc<Self>, short_name: &str) -> Result<OpAck> {
        let descriptor = self.known_descriptor(short_name)?;
        info!(service = short_name, "start requested");

        let ack = OpAck::new("starting", short_name, "starting");
        tokio::spawn(async move { self.start_sync(descriptor).await });
        Ok(ack)
    }

    pub fn stop(self: Arc<Self>, short_name: &str) -> Result<OpAck> {
        let descriptor = self.known_descriptor(short_name)?;
        info!(service = short_name, "stop requested");

        let ack = OpAck::new("stopping", short_name, "stopping");
        tokio::spawn(async move { self.stop_sync(descriptor).await });
        Ok(ack)
    }

    pub fn restart(self: Arc<Self>, short_name: &str) -> Result<OpAck> {
        let descriptor = self.known_descriptor(short_name)?;
        info!(service = short_name, "restart requested");

        let ack = OpAck::new("restarting", short_name, "restarting");
        tokio::spawn(async move { self.restart_sync(descriptor).await });
        Ok(ack)
    }

    pub fn create_and_start(self: Arc<Self>, short_name: &str) -> Result<OpAck> {
        let descriptor = self.known_descriptor(short_name)?;
        info!(service = short_name, "create-and-start requested");

        let ack = OpAck::new("creating", short_name, "being created and started");
        tokio::spawn(async move { self.create_and_start_sync(descriptor).await });
        Ok(ack)
    }

    async fn start_sync(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.runtime_name.clone();
        match self.runtime.inspect(&name).await {
            Ok(Some(details)) if details.lifecycle == Lifecycle::Running => {
                info!(container = %name, "already running");
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(container = %name, "not found, creating");
                self.create_and_start_sync(descriptor).await;
                return;
            }
            Err(error) => {
                warn!(container = %name, %error, "inspect before start failed");
                return;
            }
        }

        match self.compose.start(&descriptor.service_name).await {
            Ok(out) if out.success => info!(container = %name, "started"),
            Ok(out) => {
                warn!(container = %name, stderr = %out.stderr.trim(), "start failed");
                if is_recreation_error(&out.stderr) {
                    self.recreate(descriptor).await;
                }
            }
            Err(error) => warn!(container = %name, %error, "start failed"),
        }
    }

    async fn stop_sync(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.runtime_name.clone();
        match self.runtime.inspect(&name).await {
            Ok(Some(details)) if details.lifecycle != Lifecycle::Running => {
                info!(container = %name, "already stopped");
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(container = %name, "not found");
                return;
            }
            Err(error) => {
                warn!(container = %name, %error, "inspect before stop failed");
                return;
            }
        }

        match self.compose.stop(&descriptor.service_name).await {
            Ok(out) if out.success => info!(container = %name, "stopped"),
            Ok(out) => warn!(container = %name, stderr = %out.stderr.trim(), "stop failed"),
            Err(error) => warn!(container = %name, %error, "stop failed"),
        }
    }

    async fn restart_sync(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.runtime_name.clone();
        match self.runtime.inspect(&name).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(container = %name, "not found");
                return;
            }
            Err(error) => {
                warn!(container = %name, %error, "inspect before restart failed");
                return;
            }
        }

        match self.compose.restart(&descriptor.service_name).await {
            Ok(out) if out.success => info!(container = %name, "restarted"),
            Ok(out) => warn!(container = %name, stderr = %out.stderr.trim(), "restart failed"),
            Err(error) => warn!(container = %name, %error, "restart failed"),
        }
    }

    async fn create_and_start_sync(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.runtime_name.clone();
        match self.runtime.inspect(&name).await {
            Ok(Some(details)) if details.lifecycle == Lifecycle::Running => {
                info!(container = %name, "already running");
                return;
            }
            Ok(Some(_)) => {
                // Exists but stopped: plain start, no re-materialisation.
                match self.runtime.start(&name).await {
                    Ok(()) => info!(container = %name, "started existing container"),
                    Err(error) => warn!(container = %name, %error, "start failed"),
                }
                return;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(container = %name, %error, "inspect before create failed");
                return;
            }
        }

        if descriptor.is_manual {
            info!(
                container = %name,
                "manual profile, materialising without dependencies"
            );
        }
        match self.compose.up(&descriptor.service_name, descriptor.is_manual).await {
            Ok(out) if out.success => info!(container = %name, "created and started"),
            Ok(out) => warn!(container = %name, stderr = %out.stderr.trim(), "create failed"),
            Err(error) => warn!(container = %name, %error, "create failed"),
        }
    }

    /// One remove + re-materialise cycle after a recreation-class start
    /// failure.
    async fn recreate(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.runtime_name.clone();
        warn!(container = %name, "stale container state detected, recreating from manifest");

        match self.compose.rm(&descriptor.service_name).await {
            Ok(out) if out.success => {
                self.create_and_start_sync(descriptor).await;
            }
            Ok(out) => {
                warn!(container = %name, stderr = %out.stderr.trim(), "remove for recreation failed");
            }
            Err(error) => warn!(container = %name, %error, "remove for recreation failed"),
        }
    }

    fn known_descriptor(&self, short_name: &str) -> Result<ServiceDescriptor> {
        self.manifest
            .get(short_name)
            .cloned()
            .ok_or_else(|| Error::service_not_found(short_name))
    }

    /// A descriptor for status/log queries: manifest entry when declared,
    /// prefix-derived otherwise.
    fn descriptor_for(&self, short_name: &str) -> ServiceDescriptor {
        self.manifest.get(short_name).cloned().unwrap_or_else(|| {
            ServiceDescriptor {
                short_name: short_name.to_string(),
                runtime_name: self.manifest.runtime_name(short_name),
                service_name: short_name.to_string(),
                is_manual: false,
                profiles: Vec::new(),
            }
        })
    }
}

/// Whether a start failure's stderr implies the container must be removed
/// and re-materialised from the manifest.
pub fn is_recreation_error(stderr: &str) -> bool {
    if stderr.is_empty() {
        return false;
    }
    let lowered = stderr.to_lowercase();
    RECREATION_PATTERNS
        .iter()
        .any(|phrases| phrases.iter().all(|phrase| lowered.contains(phrase)))
}
