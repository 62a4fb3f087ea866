//! SQLite-backed [`BuildInformationRepository`].
//!
//! A save translates one [`BuildInformation`] into normalized rows:
//!
//! ```text
//! machine_info ◀── build ──▶ project (top level)
//!                    ▲
//!                    │ build_id
//!            plugin_execution ──▶ project, plugin
//! ```
//!
//! `project` and `plugin` are dictionaries shared by every build ever
//! recorded. They are filled with find-or-create: check for the natural
//! key, insert only when absent, then always re-select the id. The
//! re-select, not the insert, provides the foreign key used afterwards, so
//! a row written concurrently by another process is adopted instead of
//! duplicated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;

use crate::build::{BuildInformation, PluginExecution};
use crate::db::DatabaseManager;
use crate::error::{Result, WatcherError};
use crate::models::Artifact;
use crate::recovery;
use crate::repository::{BuildInformationRepository, StartupContext};

/// Shared dimension tables keyed by `(group_id, artifact_id, version)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Project,
    Plugin,
}

impl Dimension {
    fn table(&self) -> &'static str {
        match self {
            Dimension::Project => "project",
            Dimension::Plugin => "plugin",
        }
    }
}

pub struct SqliteBuildInformationRepository {
    manager: Arc<DatabaseManager>,
    initialized: AtomicBool,
}

impl SqliteBuildInformationRepository {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self {
            manager,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn manager(&self) -> &Arc<DatabaseManager> {
        &self.manager
    }
}

#[async_trait]
impl BuildInformationRepository for SqliteBuildInformationRepository {
    async fn initialize(&self, context: &StartupContext) -> Result<u64> {
        let pool = self.manager.load().await?;
        let cutoff = recovery::start_of_day(&context.now);

        let mut tx = pool.begin().await?;
        let removed = recovery::delete_partial_builds(&mut tx, &cutoff).await?;
        tx.commit().await?;

        self.initialized.store(true, Ordering::SeqCst);
        Ok(removed)
    }

    async fn save(&self, build: &BuildInformation) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(WatcherError::NotInitialized);
        }

        let pool = self.manager.load().await?;
        let mut tx = pool.begin().await?;

        let machine_info_id = insert_machine_info(&mut tx, build).await?;
        insert_build(&mut tx, build, machine_info_id).await?;
        insert_projects(&mut tx, build).await?;
        insert_plugin_executions(&mut tx, build).await?;

        tx.commit().await?;

        info!(
            build_id = build.id(),
            projects = build.projects().len(),
            "build history saved"
        );
        Ok(())
    }

    async fn clean_up(&self) -> Result<()> {
        self.manager.unload().await;
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

async fn insert_machine_info(conn: &mut SqliteConnection, build: &BuildInformation) -> Result<i64> {
    let machine = build.machine_info();
    let result = sqlx::query(
        "INSERT INTO machine_info (maven_version, java_version, computer_name, os, username, os_arch) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&machine.maven_version)
    .bind(&machine.java_version)
    .bind(&machine.computer_name)
    .bind(&machine.os_name)
    .bind(&machine.username)
    .bind(&machine.os_arch)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_build(
    conn: &mut SqliteConnection,
    build: &BuildInformation,
    machine_info_id: i64,
) -> Result<()> {
    let top_level_project_id =
        find_or_create(conn, Dimension::Project, build.top_level_project()).await?;
    let revision = build.revision();

    let result = sqlx::query(
        r#"
        INSERT INTO build (id, start_time, goals, top_level_project_id, data, end_time, machine_info_id, scm, scm_revision)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(build.id())
    .bind(millis(build.start_time()))
    .bind(build.goals().join(" "))
    .bind(top_level_project_id)
    .bind(build.user_data())
    .bind(build.end_time().map(millis))
    .bind(machine_info_id)
    .bind(&revision.scm)
    .bind(&revision.revision)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            Err(WatcherError::DuplicateBuild { id: build.id() })
        }
        Err(err) => Err(err.into()),
    }
}

async fn insert_projects(conn: &mut SqliteConnection, build: &BuildInformation) -> Result<()> {
    for project in build.projects() {
        find_or_create(conn, Dimension::Project, project.artifact()).await?;
    }
    Ok(())
}

async fn insert_plugin_executions(
    conn: &mut SqliteConnection,
    build: &BuildInformation,
) -> Result<()> {
    for project in build.projects() {
        let project_id = find_or_create(conn, Dimension::Project, project.artifact()).await?;
        for execution in project.plugin_executions() {
            insert_plugin_execution(conn, build.id(), project_id, execution).await?;
        }
    }
    Ok(())
}

async fn insert_plugin_execution(
    conn: &mut SqliteConnection,
    build_id: i64,
    project_id: i64,
    execution: &PluginExecution,
) -> Result<()> {
    let plugin_id = find_or_create(conn, Dimension::Plugin, &execution.plugin).await?;

    sqlx::query(
        "INSERT INTO plugin_execution (project_id, plugin_id, goal, execution_id, start_time, end_time, build_id) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(plugin_id)
    .bind(&execution.goal)
    .bind(&execution.execution_id)
    .bind(millis(execution.start_time))
    .bind(execution.end_time.map(millis))
    .bind(build_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Id of the dimension row for `artifact`, inserting it when absent.
pub async fn find_or_create(
    conn: &mut SqliteConnection,
    dimension: Dimension,
    artifact: &Artifact,
) -> Result<i64> {
    let existing: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(1) FROM {} WHERE group_id = ? AND artifact_id = ? AND version = ?",
        dimension.table()
    ))
    .bind(&artifact.group_id)
    .bind(&artifact.artifact_id)
    .bind(&artifact.version)
    .fetch_one(&mut *conn)
    .await?;

    if existing == 0 {
        insert_if_absent(conn, dimension, artifact).await?;
    }
    select_id(conn, dimension, artifact).await
}

// Another writer may have inserted the same key since the existence check.
async fn insert_if_absent(
    conn: &mut SqliteConnection,
    dimension: Dimension,
    artifact: &Artifact,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} (group_id, artifact_id, version) VALUES (?, ?, ?)",
        dimension.table()
    ))
    .bind(&artifact.group_id)
    .bind(&artifact.artifact_id)
    .bind(&artifact.version)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn select_id(
    conn: &mut SqliteConnection,
    dimension: Dimension,
    artifact: &Artifact,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(&format!(
        "SELECT id FROM {} WHERE group_id = ? AND artifact_id = ? AND version = ?",
        dimension.table()
    ))
    .bind(&artifact.group_id)
    .bind(&artifact.artifact_id)
    .bind(&artifact.version)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

fn millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}
