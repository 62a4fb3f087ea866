//! Schema migrations for the build history store.
//!
//! Migrations are numbered and applied in order, each in its own
//! transaction, and recorded in `schema_migrations`. Timestamps are stored
//! as INTEGER epoch milliseconds.
//!
//! | Version | Change |
//! |---------|--------|
//! | 1 | `machine_info`, `project`, `plugin`, `build`, `plugin_execution` |
//! | 2 | unique natural keys on `project`/`plugin`, lookup indexes |

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{Result, WatcherError};

struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create build history tables",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS machine_info (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                maven_version TEXT,
                java_version TEXT,
                computer_name TEXT,
                os TEXT,
                username TEXT,
                os_arch TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS project (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id TEXT NOT NULL,
                artifact_id TEXT NOT NULL,
                version TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS plugin (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id TEXT NOT NULL,
                artifact_id TEXT NOT NULL,
                version TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS build (
                id INTEGER PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                goals TEXT NOT NULL,
                top_level_project_id INTEGER NOT NULL,
                data TEXT,
                machine_info_id INTEGER NOT NULL,
                scm TEXT,
                scm_revision TEXT,
                FOREIGN KEY (top_level_project_id) REFERENCES project(id),
                FOREIGN KEY (machine_info_id) REFERENCES machine_info(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS plugin_execution (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                plugin_id INTEGER NOT NULL,
                goal TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                build_id INTEGER NOT NULL,
                FOREIGN KEY (project_id) REFERENCES project(id),
                FOREIGN KEY (plugin_id) REFERENCES plugin(id),
                FOREIGN KEY (build_id) REFERENCES build(id)
            )
            "#,
        ],
    },
    Migration {
        version: 2,
        description: "unique natural keys and lookup indexes",
        statements: &[
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_project_natural_key ON project(group_id, artifact_id, version)",
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_plugin_natural_key ON plugin(group_id, artifact_id, version)",
            "CREATE INDEX IF NOT EXISTS idx_plugin_execution_build_id ON plugin_execution(build_id)",
            "CREATE INDEX IF NOT EXISTS idx_build_unfinished ON build(end_time, start_time)",
        ],
    },
];

/// Highest schema version this build knows how to create.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Apply every pending migration.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current = current_version(pool).await?;
    let latest = latest_version();
    if current > latest {
        return Err(WatcherError::UnsupportedSchemaVersion {
            supported: latest,
            found: current,
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)",
        )
        .bind(migration.version)
        .bind(migration.description)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            version = migration.version,
            description = migration.description,
            "applied schema migration"
        );
    }

    Ok(())
}

/// The highest applied migration, or 0 for an empty database.
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_migrations'",
    )
    .fetch_one(pool)
    .await?;

    if !exists {
        return Ok(0);
    }

    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version)
}
