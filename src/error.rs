//! Error types for the build watcher.
//!
//! Library code returns [`WatcherError`]; the `bwatch` binary wraps it in
//! `anyhow` at the edges.

use crate::models::Artifact;

/// All errors that can be returned by the aggregator, the repository and
/// the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// A plugin event referenced a project that was never registered in the
    /// build. The dispatcher violated the aggregator's preconditions.
    #[error("project {project} is not part of the current build")]
    UnknownProject { project: Artifact },

    /// A plugin event is missing the data needed to correlate it.
    #[error("{kind} event carries no {field}")]
    MissingEventField {
        kind: &'static str,
        field: &'static str,
    },

    /// A build aggregate was requested for a session whose project list is
    /// absent or empty.
    #[error("session declares no projects")]
    NoDeclaredProjects,

    /// A plugin event arrived before any build aggregate existed.
    #[error("{kind} event received before the build was started")]
    NoActiveBuild { kind: &'static str },

    /// `save` was called before `initialize` ran startup recovery.
    #[error("repository used before initialize()")]
    NotInitialized,

    /// A build row with this primary key already exists.
    #[error("build {id} has already been recorded")]
    DuplicateBuild { id: i64 },

    /// The store was written by a newer version of the schema.
    #[error("unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchemaVersion { supported: i64, found: i64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = WatcherError> = std::result::Result<T, E>;
