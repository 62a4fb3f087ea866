//! SQLite connection management.
//!
//! [`DatabaseManager`] lazily opens one connection pool per database file,
//! migrates it, and hands out clones of that pool until
//! [`unload`](DatabaseManager::unload) closes it. Opening and closing are
//! serialized across every manager in the process, so two repositories
//! sharing one file never race on first open or on migration.
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode is enabled so a build recording its history does not block a
//! concurrent reader of the same file.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::migrate;

static LIFECYCLE_LOCK: Mutex<()> = Mutex::const_new(());
static SHARED: OnceLock<Arc<DatabaseManager>> = OnceLock::new();

pub struct DatabaseManager {
    path: PathBuf,
    pool: Mutex<Option<SqlitePool>>,
}

impl DatabaseManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.db.path.clone())
    }

    /// The process-wide manager, created from the first configuration seen.
    pub fn shared(config: &Config) -> Arc<DatabaseManager> {
        SHARED
            .get_or_init(|| Arc::new(Self::from_config(config)))
            .clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the pool, opening and migrating the database on first use.
    pub async fn load(&self) -> Result<SqlitePool> {
        let _lifecycle = LIFECYCLE_LOCK.lock().await;
        let mut cached = self.pool.lock().await;

        if let Some(pool) = cached.as_ref() {
            return Ok(pool.clone());
        }

        let pool = connect(&self.path).await?;
        if let Err(err) = migrate::run_migrations(&pool).await {
            pool.close().await;
            return Err(err);
        }
        *cached = Some(pool.clone());
        Ok(pool)
    }

    /// Close the pool if it is open. Safe to call repeatedly.
    pub async fn unload(&self) {
        let _lifecycle = LIFECYCLE_LOCK.lock().await;
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close().await;
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.pool.lock().await.is_some()
    }
}

/// Open a pool on the database file, creating it and its parent
/// directories when missing.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
