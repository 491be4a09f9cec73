//! Pure helpers for status diffing and log-tail delta computation.

use std::collections::HashMap;

use crate::fanout::messages::StatusChange;
use crate::services::ServiceStatus;

/// Compare the current poll against the previous one. A change is reported
/// when a service's `{lifecycle, health, running}` triple differs, or when a
/// created service appears for the first time.
pub fn diff_statuses(
    previous: &HashMap<String, ServiceStatus>,
    current: &[ServiceStatus],
) -> Vec<StatusChange> {
    let mut changes = Vec::new();

    for status in current {
        match previous.get(&status.name) {
            Some(prev) => {
                if prev.status != status.status
                    || prev.health != status.health
                    || prev.running != status.running
                {
                    changes.push(StatusChange {
                        name: status.name.clone(),
                        previous_status: Some(prev.status),
                        previous_health: prev.health,
                        current_status: status.status,
                        current_health: status.health,
                        running: status.running,
                        status_detail: status.status_detail.clone(),
                    });
                }
            }
            None if status.created => changes.push(StatusChange {
                name: status.name.clone(),
                previous_status: None,
                previous_health: None,
                current_status: status.status,
                current_health: status.health,
                running: status.running,
                status_detail: status.status_detail.clone(),
            }),
            None => {}
        }
    }

    changes
}

/// Lines strictly after the anchor. When the anchor is not present in the
/// fetched window (log rotation, container restart), the whole window is the
/// delta.
pub fn delta_after_anchor<'a>(lines: &'a [String], anchor: Option<&str>) -> &'a [String] {
    match anchor {
        None => lines,
        Some(anchor) => match lines.iter().position(|line| line == anchor) {
            Some(index) => &lines[index + 1..],
            None => lines,
        },
    }
}

#[cfg(test)]
mod tests {
    use compose_manifest::ServiceDescriptor;

    use super::*;
    use crate::runtime::{ContainerDetails, HealthState, Lifecycle};

    fn status(name: &str, lifecycle: Lifecycle, health: Option<HealthState>) -> ServiceStatus {
        let descriptor = ServiceDescriptor {
            short_name: name.to_string(),
            runtime_name: format!("relayer-{name}"),
            service_name: name.to_string(),
            is_manual: false,
            profiles: Vec::new(),
        };
        if lifecycle == Lifecycle::NotCreated {
            return ServiceStatus::not_created(&descriptor);
        }
        let details = ContainerDetails {
            short_id: "abc123".to_string(),
            lifecycle,
            health,
            started_at: None,
            finished_at: None,
            exit_code: None,
        };
        ServiceStatus::from_details(&descriptor, &details, chrono::Utc::now())
    }

    fn as_map(statuses: &[ServiceStatus]) -> HashMap<String, ServiceStatus> {
        statuses
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect()
    }

    #[test]
    fn unchanged_services_produce_no_changes() {
        let current = vec![status("a", Lifecycle::Running, None)];
        let previous = as_map(&current);
        assert!(diff_statuses(&previous, &current).is_empty());
    }

    #[test]
    fn triple_change_brackets_previous_and_current() {
        let previous = as_map(&[status("a", Lifecycle::Running, Some(HealthState::Healthy))]);
        let current = vec![status("a", Lifecycle::Exited, None)];

        let changes = diff_statuses(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous_status, Some(Lifecycle::Running));
        assert_eq!(changes[0].previous_health, Some(HealthState::Healthy));
        assert_eq!(changes[0].current_status, Lifecycle::Exited);
        assert!(!changes[0].running);
    }

    #[test]
    fn health_only_change_is_reported() {
        let previous = as_map(&[status("a", Lifecycle::Running, Some(HealthState::Starting))]);
        let current = vec![status("a", Lifecycle::Running, Some(HealthState::Healthy))];
        let changes = diff_statuses(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].current_health, Some(HealthState::Healthy));
    }

    #[test]
    fn new_created_service_is_reported_but_not_declared_only_ones() {
        let previous = HashMap::new();
        let current = vec![
            status("a", Lifecycle::Running, None),
            status("b", Lifecycle::NotCreated, None),
        ];
        let changes = diff_statuses(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "a");
        assert_eq!(changes[0].previous_status, None);
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn delta_without_anchor_is_the_whole_window() {
        let window = lines(&["a", "b"]);
        assert_eq!(delta_after_anchor(&window, None), window.as_slice());
    }

    #[test]
    fn delta_is_strictly_after_the_anchor() {
        let window = lines(&["a", "b", "c", "d"]);
        assert_eq!(delta_after_anchor(&window, Some("b")), &window[2..]);
        assert_eq!(delta_after_anchor(&window, Some("d")), &window[4..]);
    }

    #[test]
    fn lost_anchor_re_emits_the_window() {
        let window = lines(&["x", "y"]);
        assert_eq!(delta_after_anchor(&window, Some("gone")), window.as_slice());
    }

    #[test]
    fn snapshot_then_deltas_deliver_each_line_once() {
        // Rolling 4-line window over a growing log.
        let log: Vec<String> = (0..12).map(|i| format!("line-{i}")).collect();
        let mut delivered: Vec<String> = Vec::new();
        let mut anchor: Option<String> = None;

        for end in (4..=12).step_by(2) {
            let window = &log[end - 4..end];
            let delta = delta_after_anchor(window, anchor.as_deref());
            delivered.extend(delta.iter().cloned());
            if let Some(last) = window.last() {
                anchor = Some(last.clone());
            }
        }

        assert_eq!(delivered, log[..12].to_vec());
    }
}
