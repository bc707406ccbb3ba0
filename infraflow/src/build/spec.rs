//! Buildspec: the phased command script of a build task.

use crate::errors::BuildPhaseName;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Buildspec format version.
pub const BUILDSPEC_VERSION: &str = "0.2";

/// One phase of a buildspec.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildPhase {
    /// Runtime name to pinned version, e.g. `nodejs -> 20.x`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub runtime_versions: BTreeMap<String, String>,
    /// Shell commands, run in order.
    pub commands: Vec<String>,
}

impl BuildPhase {
    /// Creates a phase from commands.
    #[must_use]
    pub fn new(commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            runtime_versions: BTreeMap::new(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Pins a runtime version.
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>, version: impl Into<String>) -> Self {
        self.runtime_versions.insert(runtime.into(), version.into());
        self
    }

    fn to_json(&self) -> Value {
        let mut phase = Map::new();
        if !self.runtime_versions.is_empty() {
            phase.insert("runtime-versions".to_string(), json!(self.runtime_versions));
        }
        phase.insert("commands".to_string(), json!(self.commands));
        Value::Object(phase)
    }
}

/// The phased script of a build task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Format version.
    pub version: String,
    /// Dependency installation phase.
    pub install: BuildPhase,
    /// Deployment phase.
    pub build: BuildPhase,
}

impl BuildSpec {
    /// Creates a buildspec from its two phases.
    #[must_use]
    pub fn new(install: BuildPhase, build: BuildPhase) -> Self {
        Self {
            version: BUILDSPEC_VERSION.to_string(),
            install,
            build,
        }
    }

    /// Returns the phases in execution order.
    #[must_use]
    pub fn phases(&self) -> [(BuildPhaseName, &BuildPhase); 2] {
        [
            (BuildPhaseName::Install, &self.install),
            (BuildPhaseName::Build, &self.build),
        ]
    }

    /// Returns every command tagged with its phase, in execution order.
    #[must_use]
    pub fn script(&self) -> Vec<(BuildPhaseName, &str)> {
        self.phases()
            .into_iter()
            .flat_map(|(name, phase)| phase.commands.iter().map(move |c| (name, c.as_str())))
            .collect()
    }

    /// Renders the buildspec document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "version": self.version,
            "phases": {
                "install": self.install.to_json(),
                "build": self.build.to_json(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildSpec {
        BuildSpec::new(
            BuildPhase::new(["npm ci"]).with_runtime("nodejs", "20.x"),
            BuildPhase::new(["npm run deploy"]),
        )
    }

    #[test]
    fn test_script_order() {
        let spec = sample();
        assert_eq!(
            spec.script(),
            vec![
                (BuildPhaseName::Install, "npm ci"),
                (BuildPhaseName::Build, "npm run deploy"),
            ]
        );
    }

    #[test]
    fn test_to_json_shape() {
        let doc = sample().to_json();
        assert_eq!(doc["version"], "0.2");
        assert_eq!(doc["phases"]["install"]["runtime-versions"]["nodejs"], "20.x");
        assert!(doc["phases"]["build"].get("runtime-versions").is_none());
    }
}
