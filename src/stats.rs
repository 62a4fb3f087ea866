//! Store statistics and health overview.
//!
//! Gives a quick summary of what has been recorded: builds (completed and
//! unfinished), the shared project/plugin dictionaries, and plugin
//! executions. Used by `bwatch stats` to confirm that builds are being
//! captured.

use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub completed_builds: i64,
    pub unfinished_builds: i64,
    pub projects: i64,
    pub plugins: i64,
    pub plugin_executions: i64,
    /// Start time (epoch millis) of the most recent completed build.
    pub last_build_start: Option<i64>,
}

pub async fn collect(pool: &SqlitePool) -> Result<StoreStats> {
    let count = |sql: &'static str| async move {
        sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
    };

    Ok(StoreStats {
        completed_builds: count("SELECT COUNT(*) FROM build WHERE end_time IS NOT NULL").await?,
        unfinished_builds: count("SELECT COUNT(*) FROM build WHERE end_time IS NULL").await?,
        projects: count("SELECT COUNT(*) FROM project").await?,
        plugins: count("SELECT COUNT(*) FROM plugin").await?,
        plugin_executions: count("SELECT COUNT(*) FROM plugin_execution").await?,
        last_build_start: sqlx::query_scalar(
            "SELECT MAX(start_time) FROM build WHERE end_time IS NOT NULL",
        )
        .fetch_one(pool)
        .await?,
    })
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format epoch milliseconds as local `YYYY-MM-DD HH:MM`.
pub fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| millis.to_string())
}
