//! Docker Engine implementation of [`ContainerRuntime`].

use async_trait::async_trait;
use bollard::{API_DEFAULT_VERSION, Docker};
use bollard::models::{ContainerInspectResponse, ContainerStateStatusEnum, HealthStatusEnum};
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptionsBuilder, LogsOptionsBuilder,
    StartContainerOptions,
};
use chrono::{DateTime, Datelike, Utc};
use futures::StreamExt;
use tracing::debug;

use crate::runtime::{ContainerDetails, ContainerRuntime, HealthState, Lifecycle};
use crate::{Error, Result};

/// Per-request timeout at the runtime-client level, in seconds.
const CLIENT_TIMEOUT_SECS: u64 = 10;

/// Docker Engine client over the unix socket. Connections are pooled by the
/// client; nothing long-lived is held per call.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect(socket_path: &str) -> Result<Self> {
        let docker =
            Docker::connect_with_unix(socket_path, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?;
        debug!(socket = socket_path, "docker client initialized");
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_all(&self) -> Result<Vec<String>> {
        let options = ListContainersOptionsBuilder::default().all(true).build();
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|summary| {
                summary
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|name| name.trim_start_matches('/').to_string())
            })
            .collect())
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerDetails>> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(Some(details_from_inspect(response))),
            Err(error) if is_not_found(&error) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn logs_tail(&self, name: &str, tail: usize) -> Result<Option<Vec<u8>>> {
        let options = LogsOptionsBuilder::default()
            .stdout(true)
            .stderr(true)
            .timestamps(true)
            .tail(&tail.to_string())
            .build();

        let mut stream = self.docker.logs(name, Some(options));
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => buffer.extend_from_slice(&output.into_bytes()),
                Err(error) if is_not_found(&error) => return Ok(None),
                Err(error) => return Err(error.into()),
            }
        }
        Ok(Some(buffer))
    }

    async fn start(&self, name: &str) -> Result<()> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if is_not_found(&error) => Err(Error::service_not_found(name)),
            Err(error) => Err(error.into()),
        }
    }
}

fn is_not_found(error: &bollard::errors::Error) -> bool {
    matches!(
        error,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn details_from_inspect(response: ContainerInspectResponse) -> ContainerDetails {
    let short_id = response
        .id
        .map(|id| id.chars().take(12).collect())
        .unwrap_or_default();

    let state = response.state;
    let lifecycle = state
        .as_ref()
        .and_then(|s| s.status)
        .map(lifecycle_from_status)
        .unwrap_or(Lifecycle::Unknown);

    // Health only applies to running containers; docker keeps reporting the
    // last verdict while a container is stopped.
    let health = if lifecycle == Lifecycle::Running {
        state
            .as_ref()
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status)
            .and_then(health_from_status)
    } else {
        None
    };

    let started_at = state
        .as_ref()
        .and_then(|s| s.started_at.as_deref())
        .and_then(parse_timestamp);
    let finished_at = state
        .as_ref()
        .and_then(|s| s.finished_at.as_deref())
        .and_then(parse_timestamp);
    let exit_code = state.as_ref().and_then(|s| s.exit_code);

    ContainerDetails {
        short_id,
        lifecycle,
        health,
        started_at,
        finished_at,
        exit_code,
    }
}

fn lifecycle_from_status(status: ContainerStateStatusEnum) -> Lifecycle {
    match status {
        ContainerStateStatusEnum::CREATED => Lifecycle::Created,
        ContainerStateStatusEnum::RUNNING => Lifecycle::Running,
        ContainerStateStatusEnum::EXITED => Lifecycle::Exited,
        ContainerStateStatusEnum::PAUSED => Lifecycle::Paused,
        ContainerStateStatusEnum::RESTARTING => Lifecycle::Restarting,
        _ => Lifecycle::Unknown,
    }
}

fn health_from_status(status: HealthStatusEnum) -> Option<HealthState> {
    match status {
        HealthStatusEnum::HEALTHY => Some(HealthState::Healthy),
        HealthStatusEnum::UNHEALTHY => Some(HealthState::Unhealthy),
        HealthStatusEnum::STARTING => Some(HealthState::Starting),
        _ => None,
    }
}

/// Parse an inspect timestamp, treating docker's zero values (year 0001, or
/// the 1970 epoch) as unset.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    if parsed.year() <= 1970 {
        return None;
    }
    Some(parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timestamps_are_unset() {
        assert_eq!(parse_timestamp("0001-01-01T00:00:00Z"), None);
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z"), None);
        assert_eq!(parse_timestamp(""), None);
        assert!(parse_timestamp("2026-07-31T18:02:11.123456789Z").is_some());
    }

    #[test]
    fn unrecognized_status_maps_to_unknown() {
        assert_eq!(
            lifecycle_from_status(ContainerStateStatusEnum::DEAD),
            Lifecycle::Unknown
        );
        assert_eq!(
            lifecycle_from_status(ContainerStateStatusEnum::RUNNING),
            Lifecycle::Running
        );
    }
}
