//! Build results reported by the pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Outcome of one build attempt (a build generation).
///
/// `built_at_ms` strictly increases across builds of one pipeline and is the
/// only validity token the server uses for its cached handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuildResult {
    #[serde(rename_all = "camelCase")]
    Success { bundle_path: PathBuf, built_at_ms: u64 },
    #[serde(rename_all = "camelCase")]
    Failure { built_at_ms: u64 },
}

impl BuildResult {
    pub fn built_at_ms(&self) -> u64 {
        match self {
            BuildResult::Success { built_at_ms, .. } | BuildResult::Failure { built_at_ms } => {
                *built_at_ms
            }
        }
    }

    pub fn bundle_path(&self) -> Option<&Path> {
        match self {
            BuildResult::Success { bundle_path, .. } => Some(bundle_path),
            BuildResult::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Success { .. })
    }

    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildResult::Success { .. } => "success",
            BuildResult::Failure { .. } => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let success = BuildResult::Success {
            bundle_path: "/tmp/bundle.json".into(),
            built_at_ms: 10,
        };
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({ "type": "success", "bundlePath": "/tmp/bundle.json", "builtAtMs": 10 })
        );

        let failure: BuildResult =
            serde_json::from_value(json!({ "type": "failure", "builtAtMs": 11 })).unwrap();
        assert_eq!(failure, BuildResult::Failure { built_at_ms: 11 });
        assert_eq!(failure.built_at_ms(), 11);
        assert!(failure.bundle_path().is_none());
    }
}
