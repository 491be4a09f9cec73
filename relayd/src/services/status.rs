//! Reported service state and its human-readable rendering.

use chrono::{DateTime, Utc};
use compose_manifest::ServiceDescriptor;
use serde::Serialize;

use crate::runtime::{ContainerDetails, HealthState, Lifecycle};

/// Reported state of one service at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    /// Short name used by the API.
    pub name: String,
    /// Runtime container name.
    pub full_name: String,
    pub status: Lifecycle,
    pub status_detail: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// A runtime container exists for this service.
    pub created: bool,
    pub is_manual: bool,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ServiceStatus {
    /// Build from a runtime inspection.
    pub fn from_details(
        descriptor: &ServiceDescriptor,
        details: &ContainerDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: descriptor.short_name.clone(),
            full_name: descriptor.runtime_name.clone(),
            status: details.lifecycle,
            status_detail: detail_string(details, now),
            running: details.lifecycle == Lifecycle::Running,
            health: details.health,
            id: Some(details.short_id.clone()),
            created: true,
            is_manual: descriptor.is_manual,
            started_at: details.started_at,
            finished_at: details.finished_at,
        }
    }

    /// A declared service with no runtime container.
    pub fn not_created(descriptor: &ServiceDescriptor) -> Self {
        Self {
            name: descriptor.short_name.clone(),
            full_name: descriptor.runtime_name.clone(),
            status: Lifecycle::NotCreated,
            status_detail: "Not created".to_string(),
            running: false,
            health: None,
            id: None,
            created: false,
            is_manual: descriptor.is_manual,
            started_at: None,
            finished_at: None,
        }
    }

    /// Degraded entry when the runtime cannot be queried.
    pub fn unknown(descriptor: &ServiceDescriptor) -> Self {
        Self {
            name: descriptor.short_name.clone(),
            full_name: descriptor.runtime_name.clone(),
            status: Lifecycle::Unknown,
            status_detail: "Runtime unavailable".to_string(),
            running: false,
            health: None,
            id: None,
            created: false,
            is_manual: descriptor.is_manual,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Render the human-readable detail string for an inspected container.
pub fn detail_string(details: &ContainerDetails, now: DateTime<Utc>) -> String {
    match details.lifecycle {
        Lifecycle::Running => {
            let Some(started_at) = details.started_at else {
                return "Up".to_string();
            };
            let uptime = human_delta(now.signed_duration_since(started_at));
            match details.health {
                None => format!("Up {uptime}"),
                Some(HealthState::Healthy) => format!("Up {uptime} (healthy)"),
                Some(HealthState::Unhealthy) => format!("Up {uptime} (unhealthy)"),
                Some(HealthState::Starting) => format!("Up {uptime} (health: starting)"),
            }
        }
        Lifecycle::Exited => {
            let code = details.exit_code.unwrap_or(0);
            match details.finished_at {
                Some(finished_at) => {
                    let ago = human_delta(now.signed_duration_since(finished_at));
                    format!("Exited ({code}) {ago} ago")
                }
                None => format!("Exited ({code})"),
            }
        }
        other => other.capitalized().to_string(),
    }
}

/// Coarsest unit whose value is at least one; minutes and above get
/// singular/plural handling.
pub fn human_delta(delta: chrono::Duration) -> String {
    let total_seconds = delta.num_seconds().max(0);

    if total_seconds < 60 {
        format!("{total_seconds} seconds")
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        format!("{minutes} minute{}", plural(minutes))
    } else if total_seconds < 86400 {
        let hours = total_seconds / 3600;
        format!("{hours} hour{}", plural(hours))
    } else {
        let days = total_seconds / 86400;
        format!("{days} day{}", plural(days))
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            short_name: "nginx-rtmp".to_string(),
            runtime_name: "relayer-nginx-rtmp".to_string(),
            service_name: "nginx-rtmp".to_string(),
            is_manual: false,
            profiles: Vec::new(),
        }
    }

    fn details(lifecycle: Lifecycle) -> ContainerDetails {
        ContainerDetails {
            short_id: "abc123def456".to_string(),
            lifecycle,
            health: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
        }
    }

    fn at(secs_ago: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::seconds(secs_ago)
    }

    #[test]
    fn human_delta_picks_the_coarsest_unit() {
        assert_eq!(human_delta(chrono::Duration::seconds(1)), "1 seconds");
        assert_eq!(human_delta(chrono::Duration::seconds(45)), "45 seconds");
        assert_eq!(human_delta(chrono::Duration::seconds(60)), "1 minute");
        assert_eq!(human_delta(chrono::Duration::seconds(150)), "2 minutes");
        assert_eq!(human_delta(chrono::Duration::seconds(3600)), "1 hour");
        assert_eq!(human_delta(chrono::Duration::seconds(7300)), "2 hours");
        assert_eq!(human_delta(chrono::Duration::days(1)), "1 day");
        assert_eq!(human_delta(chrono::Duration::days(3)), "3 days");
    }

    #[test]
    fn running_detail_covers_every_health_state() {
        let now = Utc.with_ymd_and_hms(2026, 7, 31, 12, 0, 0).unwrap();
        let mut d = details(Lifecycle::Running);
        d.started_at = Some(at(300, now));

        assert_eq!(detail_string(&d, now), "Up 5 minutes");

        d.health = Some(HealthState::Healthy);
        assert_eq!(detail_string(&d, now), "Up 5 minutes (healthy)");

        d.health = Some(HealthState::Unhealthy);
        assert_eq!(detail_string(&d, now), "Up 5 minutes (unhealthy)");

        d.health = Some(HealthState::Starting);
        assert_eq!(detail_string(&d, now), "Up 5 minutes (health: starting)");
    }

    #[test]
    fn running_without_start_time_is_bare_up() {
        let now = Utc::now();
        assert_eq!(detail_string(&details(Lifecycle::Running), now), "Up");
    }

    #[test]
    fn exited_detail_includes_code_and_age() {
        let now = Utc.with_ymd_and_hms(2026, 7, 31, 12, 0, 0).unwrap();
        let mut d = details(Lifecycle::Exited);
        d.exit_code = Some(137);
        d.finished_at = Some(at(7200, now));
        assert_eq!(detail_string(&d, now), "Exited (137) 2 hours ago");

        d.finished_at = None;
        assert_eq!(detail_string(&d, now), "Exited (137)");
    }

    #[test]
    fn other_lifecycles_use_the_capitalized_word() {
        let now = Utc::now();
        assert_eq!(detail_string(&details(Lifecycle::Created), now), "Created");
        assert_eq!(detail_string(&details(Lifecycle::Paused), now), "Paused");
        assert_eq!(
            detail_string(&details(Lifecycle::Restarting), now),
            "Restarting"
        );
        assert_eq!(detail_string(&details(Lifecycle::Unknown), now), "Unknown");
    }

    #[test]
    fn wire_shape_omits_unset_fields() {
        let status = ServiceStatus::not_created(&descriptor());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "not-created");
        assert_eq!(json["running"], false);
        assert!(json.get("health").is_none());
        assert!(json.get("startedAt").is_none());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn wire_shape_includes_runtime_fields_when_present() {
        let now = Utc::now();
        let mut d = details(Lifecycle::Running);
        d.health = Some(HealthState::Healthy);
        d.started_at = Some(now - chrono::Duration::seconds(90));

        let status = ServiceStatus::from_details(&descriptor(), &d, now);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["health"], "healthy");
        assert_eq!(json["id"], "abc123def456");
        assert_eq!(json["running"], true);
        assert!(json["startedAt"].is_string());
    }
}
