//! In-memory build aggregate.
//!
//! A [`BuildInformation`] is created once per build, when the host first
//! reports a non-empty project list, and is fed every plugin lifecycle
//! event after that. Start and end callbacks of the same plugin execution
//! are folded into one [`PluginExecution`] through a per-project index
//! keyed by [`ExecutionKey`].
//!
//! The aggregate is owned by the dispatcher for the whole build and is not
//! meant to be shared between threads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{Result, WatcherError};
use crate::events::{ExecutionEvent, PluginPhase, Session};
use crate::models::{Artifact, CodeRevision, ExecutionKey, MachineInfo};

/// One run of a plugin goal within a project.
#[derive(Debug, Clone)]
pub struct PluginExecution {
    pub plugin: Artifact,
    pub goal: String,
    pub execution_id: String,
    pub start_time: DateTime<Utc>,
    /// Set when the execution succeeded. Failed executions keep `None`.
    pub end_time: Option<DateTime<Utc>>,
}

impl PluginExecution {
    fn new(plugin: Artifact, goal: String, execution_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            plugin,
            goal,
            execution_id,
            start_time,
            end_time: None,
        }
    }

    pub fn key(&self) -> ExecutionKey {
        ExecutionKey::new(&self.plugin, &self.goal, &self.execution_id)
    }
}

/// A module of the build with the plugin executions run against it.
#[derive(Debug, Clone)]
pub struct Project {
    artifact: Artifact,
    executions: Vec<PluginExecution>,
    index: HashMap<ExecutionKey, usize>,
}

impl Project {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            executions: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Executions in the order they were first seen.
    pub fn plugin_executions(&self) -> &[PluginExecution] {
        &self.executions
    }

    /// Apply one plugin lifecycle callback.
    ///
    /// The first callback for a key creates the execution with `at` as its
    /// start time; later callbacks for the same key reuse it. Only a
    /// `Succeeded` phase stamps the end time.
    pub fn record(
        &mut self,
        plugin: &Artifact,
        goal: &str,
        execution_id: &str,
        phase: PluginPhase,
        at: DateTime<Utc>,
    ) -> &PluginExecution {
        let key = ExecutionKey::new(plugin, goal, execution_id);
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                self.executions.push(PluginExecution::new(
                    plugin.clone(),
                    goal.to_string(),
                    execution_id.to_string(),
                    at,
                ));
                let position = self.executions.len() - 1;
                self.index.insert(key, position);
                position
            }
        };

        let execution = &mut self.executions[position];
        if phase == PluginPhase::Succeeded {
            execution.end_time = Some(at);
        }
        execution
    }
}

/// Everything observed about one build, ready to be persisted.
#[derive(Debug, Clone)]
pub struct BuildInformation {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    goals: Vec<String>,
    user_data: Option<String>,
    top_level_project: Artifact,
    projects: Vec<Project>,
    project_index: HashMap<Artifact, usize>,
    revision: CodeRevision,
    machine_info: MachineInfo,
    events_recorded: usize,
}

impl BuildInformation {
    /// Start a build from the session's declared shape.
    ///
    /// Every declared project is registered up front, once per identity, so
    /// modules without any plugin execution are still part of the build.
    /// A session without declared projects cannot start a build.
    pub fn new(session: &Session, user_data: Option<String>, revision: CodeRevision) -> Result<Self> {
        let declared = session
            .declared_projects()
            .ok_or(WatcherError::NoDeclaredProjects)?;

        let mut build = Self {
            start_time: session.start_time,
            end_time: None,
            goals: session.goals.clone(),
            user_data,
            top_level_project: session
                .top_level_project
                .clone()
                .unwrap_or_else(|| declared[0].clone()),
            projects: Vec::with_capacity(declared.len()),
            project_index: HashMap::with_capacity(declared.len()),
            revision,
            machine_info: MachineInfo::from_properties(&session.system_properties),
            events_recorded: 0,
        };

        for artifact in declared {
            build.find_or_create_project(artifact);
        }
        Ok(build)
    }

    fn find_or_create_project(&mut self, artifact: &Artifact) -> usize {
        if let Some(&position) = self.project_index.get(artifact) {
            return position;
        }
        self.projects.push(Project::new(artifact.clone()));
        let position = self.projects.len() - 1;
        self.project_index.insert(artifact.clone(), position);
        position
    }

    /// Apply a plugin lifecycle event, stamped with the current time.
    pub fn record_plugin_event(&mut self, event: &ExecutionEvent) -> Result<()> {
        self.record_plugin_event_at(event, Utc::now())
    }

    /// Apply a plugin lifecycle event, stamped with `at`.
    ///
    /// The event's project must have been declared when the build started;
    /// anything else is a contract violation.
    pub fn record_plugin_event_at(&mut self, event: &ExecutionEvent, at: DateTime<Utc>) -> Result<()> {
        let kind = event.kind.as_str();
        let phase = event.kind.plugin_phase().ok_or(WatcherError::MissingEventField {
            kind,
            field: "plugin phase",
        })?;
        let project = event
            .project
            .as_ref()
            .ok_or(WatcherError::MissingEventField {
                kind,
                field: "project",
            })?;
        let invocation = event
            .plugin
            .as_ref()
            .ok_or(WatcherError::MissingEventField {
                kind,
                field: "plugin",
            })?;

        let position = *self
            .project_index
            .get(project)
            .ok_or_else(|| WatcherError::UnknownProject {
                project: project.clone(),
            })?;

        self.projects[position].record(
            &invocation.plugin,
            &invocation.goal,
            &invocation.execution_id,
            phase,
            at,
        );
        self.events_recorded += 1;
        Ok(())
    }

    /// Mark the build as completed successfully.
    pub fn set_end_time(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
    }

    /// Build id: the start time in epoch milliseconds.
    pub fn id(&self) -> i64 {
        self.start_time.timestamp_millis()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    pub fn user_data(&self) -> Option<&str> {
        self.user_data.as_deref()
    }

    pub fn top_level_project(&self) -> &Artifact {
        &self.top_level_project
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, artifact: &Artifact) -> Option<&Project> {
        self.project_index
            .get(artifact)
            .map(|&position| &self.projects[position])
    }

    pub fn revision(&self) -> &CodeRevision {
        &self.revision
    }

    pub fn machine_info(&self) -> &MachineInfo {
        &self.machine_info
    }

    /// Number of plugin events applied so far.
    pub fn events_recorded(&self) -> usize {
        self.events_recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, PluginInvocation};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn project() -> Artifact {
        Artifact::new("group", "artifact", "version")
    }

    fn session_with(projects: Vec<Artifact>) -> Arc<Session> {
        let mut session = Session::new(Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap());
        session.goals = vec!["clean".to_string(), "verify".to_string()];
        session.projects = Some(projects);
        Arc::new(session)
    }

    fn plugin_event(
        session: &Arc<Session>,
        kind: EventKind,
        (group, artifact, version, goal, execution): (&str, &str, &str, &str, &str),
    ) -> ExecutionEvent {
        ExecutionEvent::for_plugin(
            kind,
            session.clone(),
            project(),
            PluginInvocation::new(Artifact::new(group, artifact, version), goal, execution),
        )
    }

    const PLUGIN: (&str, &str, &str, &str, &str) = (
        "plugin-group",
        "plugin-artifact",
        "plugin-version",
        "plugin-goal",
        "execution",
    );

    fn runs(build: &mut BuildInformation, session: &Arc<Session>, plugin: (&str, &str, &str, &str, &str)) {
        build
            .record_plugin_event(&plugin_event(session, EventKind::PluginStarted, plugin))
            .unwrap();
        build
            .record_plugin_event(&plugin_event(session, EventKind::PluginSucceeded, plugin))
            .unwrap();
    }

    fn executions(build: &BuildInformation) -> &[PluginExecution] {
        build.project(&project()).unwrap().plugin_executions()
    }

    fn assert_full_execution(
        execution: &PluginExecution,
        (group, artifact, version, goal, execution_id): (&str, &str, &str, &str, &str),
    ) {
        assert_eq!(execution.plugin, Artifact::new(group, artifact, version));
        assert_eq!(execution.goal, goal);
        assert_eq!(execution.execution_id, execution_id);
        assert!(execution.end_time.is_some(), "we should have set the end time");
    }

    #[test]
    fn test_id_is_start_time_millis() {
        let session = session_with(vec![project()]);
        let build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        assert_eq!(build.id(), session.start_time.timestamp_millis());
        assert_eq!(build.goals(), ["clean", "verify"]);
        assert!(build.end_time().is_none());
    }

    #[test]
    fn test_session_without_projects_cannot_start_a_build() {
        for projects in [None, Some(Vec::new())] {
            let mut session = Session::new(Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap());
            session.projects = projects;

            let err = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap_err();
            assert!(matches!(err, WatcherError::NoDeclaredProjects));
        }
    }

    #[test]
    fn test_declared_projects_are_registered_once() {
        let other = Artifact::new("group", "other", "version");
        let session = session_with(vec![project(), other.clone(), project()]);
        let build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();

        let artifacts: Vec<_> = build.projects().iter().map(|p| p.artifact().clone()).collect();
        assert_eq!(artifacts, vec![project(), other]);
    }

    #[test]
    fn test_top_level_project_defaults_to_first_declared() {
        let session = session_with(vec![project()]);
        let build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        assert_eq!(build.top_level_project(), &project());

        let mut explicit = (*session).clone();
        explicit.top_level_project = Some(Artifact::new("root", "root", "1"));
        let build = BuildInformation::new(&explicit, None, CodeRevision::unknown()).unwrap();
        assert_eq!(build.top_level_project(), &Artifact::new("root", "root", "1"));
    }

    #[test]
    fn test_start_event_creates_open_execution() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();

        build
            .record_plugin_event(&plugin_event(&session, EventKind::PluginStarted, PLUGIN))
            .unwrap();

        let execution = &executions(&build)[0];
        assert_eq!(execution.goal, "plugin-goal");
        assert!(execution.end_time.is_none());
    }

    #[test]
    fn test_success_closes_the_same_execution() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        let started = Utc.with_ymd_and_hms(2024, 6, 15, 9, 31, 0).unwrap();
        let finished = started + Duration::seconds(4);

        build
            .record_plugin_event_at(&plugin_event(&session, EventKind::PluginStarted, PLUGIN), started)
            .unwrap();
        build
            .record_plugin_event_at(&plugin_event(&session, EventKind::PluginSucceeded, PLUGIN), finished)
            .unwrap();

        assert_eq!(executions(&build).len(), 1);
        assert_eq!(executions(&build)[0].start_time, started);
        assert_eq!(executions(&build)[0].end_time, Some(finished));
        assert_eq!(build.events_recorded(), 2);
    }

    #[test]
    fn test_failure_leaves_end_time_unset() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();

        build
            .record_plugin_event(&plugin_event(&session, EventKind::PluginStarted, PLUGIN))
            .unwrap();
        build
            .record_plugin_event(&plugin_event(&session, EventKind::PluginFailed, PLUGIN))
            .unwrap();

        assert_eq!(executions(&build).len(), 1);
        assert!(executions(&build)[0].end_time.is_none());
    }

    #[test]
    fn test_different_group_ids_are_distinct_executions() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        let other = ("other-plugin-group", "plugin-artifact", "plugin-version", "plugin-goal", "execution");
        runs(&mut build, &session, PLUGIN);
        runs(&mut build, &session, other);

        assert_eq!(executions(&build).len(), 2);
        assert_full_execution(&executions(&build)[0], PLUGIN);
        assert_full_execution(&executions(&build)[1], other);
    }

    #[test]
    fn test_different_artifact_ids_are_distinct_executions() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        let other = ("plugin-group", "other-plugin-artifact", "plugin-version", "plugin-goal", "execution");
        runs(&mut build, &session, PLUGIN);
        runs(&mut build, &session, other);

        assert_eq!(executions(&build).len(), 2);
        assert_full_execution(&executions(&build)[1], other);
    }

    #[test]
    fn test_different_goals_are_distinct_executions() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        let other = ("plugin-group", "plugin-artifact", "plugin-version", "plugin-other-goal", "execution");
        runs(&mut build, &session, PLUGIN);
        runs(&mut build, &session, other);

        assert_eq!(executions(&build).len(), 2);
        assert_full_execution(&executions(&build)[1], other);
    }

    #[test]
    fn test_different_execution_ids_are_distinct_executions() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        let other = ("plugin-group", "plugin-artifact", "plugin-version", "plugin-goal", "other-execution");
        runs(&mut build, &session, PLUGIN);
        runs(&mut build, &session, other);

        assert_eq!(executions(&build).len(), 2);
        assert_full_execution(&executions(&build)[1], other);
    }

    #[test]
    fn test_unknown_project_is_rejected() {
        let session = session_with(vec![Artifact::new("some", "other", "1")]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();

        let err = build
            .record_plugin_event(&plugin_event(&session, EventKind::PluginStarted, PLUGIN))
            .unwrap_err();
        assert!(matches!(err, WatcherError::UnknownProject { .. }));
        assert_eq!(build.events_recorded(), 0);
    }

    #[test]
    fn test_event_without_plugin_is_rejected() {
        let session = session_with(vec![project()]);
        let mut build = BuildInformation::new(&session, None, CodeRevision::unknown()).unwrap();
        let mut event = ExecutionEvent::new(EventKind::PluginStarted, session.clone());
        event.project = Some(project());

        let err = build.record_plugin_event(&event).unwrap_err();
        assert!(matches!(
            err,
            WatcherError::MissingEventField { field: "plugin", .. }
        ));
    }
}
