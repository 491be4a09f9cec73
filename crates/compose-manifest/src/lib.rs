//! Declarative service manifest parsing.
//!
//! The manifest is a compose file. For each declared service this crate
//! derives the short name used by the control API, the runtime-unique
//! container name, and whether the service carries the `manual` profile
//! (manual services are materialised without touching their dependencies).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Declarative record for one managed service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Identifier used by the control API.
    pub short_name: String,
    /// Container name used by the runtime.
    pub runtime_name: String,
    /// Service key in the compose file.
    pub service_name: String,
    /// Service carries the `manual` profile.
    pub is_manual: bool,
    /// All declared profiles.
    pub profiles: Vec<String>,
}

/// The parsed manifest: all declared services, keyed by short name.
#[derive(Debug, Clone)]
pub struct ServiceManifest {
    project_name: String,
    services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Default, Deserialize)]
struct ComposeService {
    container_name: Option<String>,
    #[serde(default)]
    profiles: Vec<String>,
}

impl ServiceManifest {
    /// Load and parse the manifest file.
    pub fn load(path: impl AsRef<Path>, project_name: &str) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw, project_name)
    }

    /// Parse manifest content. A file without a `services` section yields an
    /// empty manifest rather than an error.
    pub fn parse(raw: &str, project_name: &str) -> Result<Self, ManifestError> {
        let compose: ComposeFile = serde_yaml::from_str(raw)?;
        let prefix = format!("{project_name}-");

        let services = compose
            .services
            .into_iter()
            .map(|(service_name, config)| {
                let runtime_name = config
                    .container_name
                    .as_deref()
                    .map(|name| interpolate(name, |var| std::env::var(var).ok()))
                    .unwrap_or_else(|| format!("{project_name}-{service_name}"));

                let short_name = runtime_name
                    .strip_prefix(&prefix)
                    .map(str::to_string)
                    .unwrap_or_else(|| service_name.clone());

                let is_manual = config.profiles.iter().any(|p| p == "manual");

                ServiceDescriptor {
                    short_name,
                    runtime_name,
                    service_name,
                    is_manual,
                    profiles: config.profiles,
                }
            })
            .collect::<Vec<_>>();

        debug!(count = services.len(), "parsed service manifest");
        Ok(Self {
            project_name: project_name.to_string(),
            services,
        })
    }

    /// A manifest with no declared services.
    pub fn empty(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            services: Vec::new(),
        }
    }

    /// All declared services.
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Look up a service by its short name.
    pub fn get(&self, short_name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.short_name == short_name)
    }

    /// Resolve a short name to a runtime container name, falling back to the
    /// project prefix pattern for names not present in the manifest.
    pub fn runtime_name(&self, short_name: &str) -> String {
        self.get(short_name)
            .map(|s| s.runtime_name.clone())
            .unwrap_or_else(|| format!("{}-{}", self.project_name, short_name))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Resolve `${VAR}` and `${VAR:-default}` references in a manifest value.
fn interpolate<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    static VAR_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = VAR_PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid pattern")
    });

    pattern
        .replace_all(value, |caps: &regex::Captures<'_>| {
            lookup(&caps[1])
                .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
services:
  nginx-rtmp:
    image: custom/nginx-rtmp
    ports:
      - "1935:1935"
  controller:
    container_name: relayer-controller
    build: ./controller
  obs-overlay:
    container_name: "${PROJECT_NAME:-relayer}-obs-overlay"
    profiles:
      - manual
"#;

    #[test]
    fn derives_runtime_names_and_short_names() {
        let manifest = ServiceManifest::parse(MANIFEST, "relayer").unwrap();
        assert_eq!(manifest.len(), 3);

        let controller = manifest.get("controller").unwrap();
        assert_eq!(controller.runtime_name, "relayer-controller");
        assert_eq!(controller.service_name, "controller");
        assert!(!controller.is_manual);

        // No container_name: runtime name is generated from the project.
        let nginx = manifest.get("nginx-rtmp").unwrap();
        assert_eq!(nginx.runtime_name, "relayer-nginx-rtmp");
    }

    #[test]
    fn default_interpolation_applies_without_env() {
        let manifest = ServiceManifest::parse(MANIFEST, "relayer").unwrap();
        let overlay = manifest.get("obs-overlay").unwrap();
        assert_eq!(overlay.runtime_name, "relayer-obs-overlay");
        assert!(overlay.is_manual);
        assert_eq!(overlay.profiles, vec!["manual".to_string()]);
    }

    #[test]
    fn short_name_falls_back_to_service_key_without_prefix() {
        let raw = "services:\n  db:\n    container_name: shared-postgres\n";
        let manifest = ServiceManifest::parse(raw, "relayer").unwrap();
        let db = manifest.get("db").unwrap();
        assert_eq!(db.short_name, "db");
        assert_eq!(db.runtime_name, "shared-postgres");
    }

    #[test]
    fn runtime_name_lookup_falls_back_to_prefix_pattern() {
        let manifest = ServiceManifest::empty("relayer");
        assert_eq!(manifest.runtime_name("ghost"), "relayer-ghost");
    }

    #[test]
    fn missing_services_section_is_empty_not_an_error() {
        let manifest = ServiceManifest::parse("version: '3'\n", "relayer").unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(ServiceManifest::parse("services: [:", "relayer").is_err());
    }

    #[test]
    fn interpolation_resolves_env_then_default() {
        let lookup = |var: &str| (var == "SET_VAR").then(|| "from-env".to_string());
        assert_eq!(interpolate("${SET_VAR}-x", lookup), "from-env-x");
        assert_eq!(interpolate("${UNSET_VAR:-fallback}", lookup), "fallback");
        assert_eq!(interpolate("${UNSET_VAR}", lookup), "");
        assert_eq!(interpolate("plain", lookup), "plain");
    }
}
