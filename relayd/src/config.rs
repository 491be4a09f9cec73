//! Environment-driven configuration.

use std::path::PathBuf;

use crate::api::server::ApiServerConfig;

/// Everything the control plane needs to run.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Container runtime endpoint.
    pub runtime_socket: String,
    /// Declarative service manifest.
    pub manifest_path: PathBuf,
    /// Prefix for runtime container names.
    pub project_name: String,
    /// Privacy mode persistence path.
    pub privacy_mode_file: PathBuf,
    /// Optional directory for rolling log files.
    pub log_dir: Option<String>,
    pub api: ApiServerConfig,
}

impl ControllerSettings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        Self {
            runtime_socket: env_string("RUNTIME_SOCKET", "/var/run/docker.sock"),
            manifest_path: PathBuf::from(env_string(
                "MANIFEST_PATH",
                "/app/docker-compose.yml",
            )),
            project_name: env_string("PROJECT_NAME", "relayer"),
            privacy_mode_file: PathBuf::from(env_string(
                "PRIVACY_MODE_FILE",
                "/app/shared/privacy_mode.json",
            )),
            log_dir: std::env::var("LOG_DIR").ok().filter(|v| !v.trim().is_empty()),
            api: ApiServerConfig::from_env_or_default(),
        }
    }
}

pub(crate) fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
