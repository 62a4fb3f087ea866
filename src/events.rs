//! Lifecycle events consumed from the host build tool.
//!
//! The host delivers one [`ExecutionEvent`] per lifecycle callback, in
//! order, for a single build. Every event carries a handle to the
//! [`Session`] it belongs to; the session's contents grow over time (the
//! project list is known at start, per-project results only at the end).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Artifact;

/// Kind of lifecycle callback.
///
/// Only the session and plugin kinds are acted upon; anything else the
/// host emits deserializes to [`EventKind::Other`] and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    SessionStarted,
    SessionEnded,
    PluginStarted,
    PluginSucceeded,
    PluginFailed,
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session-started",
            EventKind::SessionEnded => "session-ended",
            EventKind::PluginStarted => "plugin-started",
            EventKind::PluginSucceeded => "plugin-succeeded",
            EventKind::PluginFailed => "plugin-failed",
            EventKind::Other => "other",
        }
    }

    /// The plugin lifecycle phase, for plugin-related kinds.
    pub fn plugin_phase(&self) -> Option<PluginPhase> {
        match self {
            EventKind::PluginStarted => Some(PluginPhase::Started),
            EventKind::PluginSucceeded => Some(PluginPhase::Succeeded),
            EventKind::PluginFailed => Some(PluginPhase::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginPhase {
    Started,
    Succeeded,
    Failed,
}

/// The plugin goal being executed: the plugin coordinate, the goal and the
/// execution id from the build descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInvocation {
    pub plugin: Artifact,
    pub goal: String,
    pub execution_id: String,
}

impl PluginInvocation {
    pub fn new(plugin: Artifact, goal: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            plugin,
            goal: goal.into(),
            execution_id: execution_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Success,
    Failure,
}

/// Outcome of one project once the session has ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResult {
    pub project: Artifact,
    pub status: BuildStatus,
}

/// The overall build session as seen by the host tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Declared projects of the reactor. `None` until the host has
    /// resolved the project list.
    #[serde(default)]
    pub projects: Option<Vec<Artifact>>,
    #[serde(default)]
    pub top_level_project: Option<Artifact>,
    #[serde(default)]
    pub goals: Vec<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub system_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub base_directory: PathBuf,
    /// Per-project outcomes, filled in when the session ends.
    #[serde(default)]
    pub results: Vec<ProjectResult>,
}

impl Session {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            projects: None,
            top_level_project: None,
            goals: Vec::new(),
            start_time,
            system_properties: BTreeMap::new(),
            base_directory: PathBuf::new(),
            results: Vec::new(),
        }
    }

    /// The declared project list, if it is known and non-empty.
    pub fn declared_projects(&self) -> Option<&[Artifact]> {
        match self.projects.as_deref() {
            Some(projects) if !projects.is_empty() => Some(projects),
            _ => None,
        }
    }

    /// True when no declared project finished with a failure.
    pub fn is_successful(&self) -> bool {
        let projects = self.projects.as_deref().unwrap_or_default();
        !self.results.iter().any(|result| {
            result.status == BuildStatus::Failure && projects.contains(&result.project)
        })
    }
}

/// One lifecycle callback.
#[derive(Debug, Clone)]
pub struct ExecutionEvent {
    pub kind: EventKind,
    /// The project the event belongs to, for project-scoped events.
    pub project: Option<Artifact>,
    /// The executing plugin, for plugin events.
    pub plugin: Option<PluginInvocation>,
    pub session: Arc<Session>,
}

impl ExecutionEvent {
    pub fn new(kind: EventKind, session: Arc<Session>) -> Self {
        Self {
            kind,
            project: None,
            plugin: None,
            session,
        }
    }

    pub fn for_plugin(
        kind: EventKind,
        session: Arc<Session>,
        project: Artifact,
        plugin: PluginInvocation,
    ) -> Self {
        Self {
            kind,
            project: Some(project),
            plugin: Some(plugin),
            session,
        }
    }
}
