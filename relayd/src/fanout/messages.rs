//! Subscription surface message schema.
//!
//! JSON-framed tagged unions. Every broadcast carries a UTC `timestamp`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::{HealthState, Lifecycle};
use crate::scene::Scene;
use crate::services::ServiceStatus;

/// Messages emitted by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent exactly once on connect.
    InitialState {
        timestamp: DateTime<Utc>,
        containers: Vec<ServiceStatus>,
        current_scene: Scene,
        privacy_enabled: bool,
        scene_timestamp: DateTime<Utc>,
    },
    /// One or more services changed their `{lifecycle, health, running}`
    /// triple, or a new service appeared. Carries the scene/privacy snapshot
    /// as a fallback.
    StatusChange {
        timestamp: DateTime<Utc>,
        changes: Vec<StatusChange>,
        current_scene: Scene,
        privacy_enabled: bool,
    },
    SceneChange {
        timestamp: DateTime<Utc>,
        current_scene: Scene,
        privacy_enabled: bool,
        change_data: SceneChangeData,
    },
    PrivacyChange {
        timestamp: DateTime<Utc>,
        current_scene: Scene,
        privacy_enabled: bool,
        change_data: PrivacyChangeData,
    },
    /// Response to `subscribe_logs`: the recent window for one service.
    LogSnapshot {
        timestamp: DateTime<Utc>,
        container: String,
        logs: Vec<String>,
    },
    /// Lines newer than the per-service anchor.
    NewLogs {
        timestamp: DateTime<Utc>,
        container: String,
        logs: Vec<String>,
    },
}

/// One service's observed transition.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub name: String,
    #[serde(rename = "previousStatus")]
    pub previous_status: Option<Lifecycle>,
    #[serde(rename = "previousHealth")]
    pub previous_health: Option<HealthState>,
    #[serde(rename = "currentStatus")]
    pub current_status: Lifecycle,
    #[serde(rename = "currentHealth")]
    pub current_health: Option<HealthState>,
    pub running: bool,
    #[serde(rename = "statusDetail")]
    pub status_detail: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SceneChangeData {
    pub previous_scene: Scene,
    pub current_scene: Scene,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PrivacyChangeData {
    pub enabled: bool,
    pub timestamp: DateTime<Utc>,
}

/// Messages accepted from clients. Unknown types fail to parse and are
/// logged and ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeLogs {
        container: String,
        lines: Option<usize>,
    },
    UnsubscribeLogs {
        container: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_messages_are_tagged_snake_case() {
        let msg = ServerMessage::SceneChange {
            timestamp: Utc::now(),
            current_scene: Scene::Live,
            privacy_enabled: false,
            change_data: SceneChangeData {
                previous_scene: Scene::Fallback,
                current_scene: Scene::Live,
                timestamp: Utc::now(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "scene_change");
        assert_eq!(json["current_scene"], "LIVE");
        assert_eq!(json["change_data"]["previous_scene"], "FALLBACK");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn status_change_uses_camel_case_fields() {
        let msg = ServerMessage::StatusChange {
            timestamp: Utc::now(),
            changes: vec![StatusChange {
                name: "nginx-rtmp".to_string(),
                previous_status: Some(Lifecycle::Running),
                previous_health: None,
                current_status: Lifecycle::Exited,
                current_health: None,
                running: false,
                status_detail: "Exited (1) 5 seconds ago".to_string(),
            }],
            current_scene: Scene::Fallback,
            privacy_enabled: true,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status_change");
        let change = &json["changes"][0];
        assert_eq!(change["previousStatus"], "running");
        assert_eq!(change["currentStatus"], "exited");
        assert_eq!(change["statusDetail"], "Exited (1) 5 seconds ago");
    }

    #[test]
    fn client_messages_parse_and_reject_unknown_types() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe_logs","container":"nginx-rtmp","lines":25}"#)
                .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SubscribeLogs { ref container, lines: Some(25) } if container == "nginx-rtmp"
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"unsubscribe_logs","container":"x"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::UnsubscribeLogs { .. }));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }
}
