//! The program scene.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The selected program source at a given moment. The program is always in
/// exactly one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scene {
    /// Camera ingest.
    Live,
    /// Looping offline source.
    Fallback,
}

impl Scene {
    /// Lowercase form used in URL path segments.
    pub fn as_path_segment(&self) -> &'static str {
        match self {
            Scene::Live => "live",
            Scene::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path_segment())
    }
}

#[derive(Debug, Error)]
#[error("unknown scene: {0}")]
pub struct ParseSceneError(String);

impl FromStr for Scene {
    type Err = ParseSceneError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Scene::Live),
            "fallback" => Ok(Scene::Fallback),
            other => Err(ParseSceneError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("LIVE".parse::<Scene>().unwrap(), Scene::Live);
        assert_eq!("fallback".parse::<Scene>().unwrap(), Scene::Fallback);
        assert!("offline".parse::<Scene>().is_err());
    }

    #[test]
    fn serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Scene::Live).unwrap(), "\"LIVE\"");
        assert_eq!(
            serde_json::to_string(&Scene::Fallback).unwrap(),
            "\"FALLBACK\""
        );
    }
}
