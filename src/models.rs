//! Identity and value types shared by the aggregator and the store.
//!
//! [`Artifact`] is the natural key of both dimension tables (`project` and
//! `plugin`). [`ExecutionKey`] correlates the start and end callbacks of a
//! single plugin execution within one project.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `groupId:artifactId:version` coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl Artifact {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Correlation key of a plugin execution inside one project.
///
/// Made of the plugin's group and artifact ids, the goal and the execution
/// id, in that order. The plugin version is deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionKey {
    pub group_id: String,
    pub artifact_id: String,
    pub goal: String,
    pub execution_id: String,
}

impl ExecutionKey {
    pub fn new(plugin: &Artifact, goal: &str, execution_id: &str) -> Self {
        Self {
            group_id: plugin.group_id.clone(),
            artifact_id: plugin.artifact_id.clone(),
            goal: goal.to_string(),
            execution_id: execution_id.to_string(),
        }
    }
}

/// Source-control descriptor of the build's working directory.
///
/// Both fields absent means no recognized SCM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRevision {
    pub scm: Option<String>,
    pub revision: Option<String>,
}

impl CodeRevision {
    pub fn new(scm: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            scm: Some(scm.into()),
            revision: Some(revision.into()),
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.scm.is_none() && self.revision.is_none()
    }
}

/// Snapshot of the machine the build ran on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineInfo {
    pub maven_version: Option<String>,
    pub java_version: Option<String>,
    pub computer_name: Option<String>,
    pub os_name: Option<String>,
    pub os_arch: Option<String>,
    pub username: Option<String>,
}

impl MachineInfo {
    /// Read the snapshot from the build's system properties.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| properties.get(key).cloned();
        Self {
            maven_version: get("maven.version"),
            java_version: get("java.version"),
            computer_name: get("env.COMPUTERNAME").or_else(|| get("env.HOSTNAME")),
            os_name: get("os.name"),
            os_arch: get("os.arch"),
            username: get("user.name"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_display() {
        let artifact = Artifact::new("org.example", "core", "1.0");
        assert_eq!(artifact.to_string(), "org.example:core:1.0");
    }

    #[test]
    fn test_execution_key_has_no_field_boundary_collisions() {
        let a = ExecutionKey::new(&Artifact::new("ab", "c", "1"), "goal", "exec");
        let b = ExecutionKey::new(&Artifact::new("a", "bc", "1"), "goal", "exec");
        assert_ne!(a, b);
    }

    #[test]
    fn test_execution_key_ignores_plugin_version() {
        let a = ExecutionKey::new(&Artifact::new("g", "a", "1"), "goal", "exec");
        let b = ExecutionKey::new(&Artifact::new("g", "a", "2"), "goal", "exec");
        assert_eq!(a, b);
    }

    #[test]
    fn test_machine_info_from_properties() {
        let mut props = BTreeMap::new();
        props.insert("maven.version".to_string(), "3.9.6".to_string());
        props.insert("java.version".to_string(), "21".to_string());
        props.insert("env.HOSTNAME".to_string(), "ci-01".to_string());
        props.insert("os.name".to_string(), "Linux".to_string());
        props.insert("os.arch".to_string(), "amd64".to_string());
        props.insert("user.name".to_string(), "builder".to_string());

        let info = MachineInfo::from_properties(&props);
        assert_eq!(info.maven_version.as_deref(), Some("3.9.6"));
        assert_eq!(info.computer_name.as_deref(), Some("ci-01"));
        assert_eq!(info.username.as_deref(), Some("builder"));
    }

    #[test]
    fn test_computer_name_prefers_computername() {
        let mut props = BTreeMap::new();
        props.insert("env.COMPUTERNAME".to_string(), "WIN-BOX".to_string());
        props.insert("env.HOSTNAME".to_string(), "linux-box".to_string());
        let info = MachineInfo::from_properties(&props);
        assert_eq!(info.computer_name.as_deref(), Some("WIN-BOX"));
    }

    #[test]
    fn test_unknown_revision() {
        assert!(CodeRevision::unknown().is_unknown());
        assert!(!CodeRevision::new("git", "abc123").is_unknown());
    }
}
