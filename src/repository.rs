//! Persistence contract for build history.
//!
//! A [`BuildInformationRepository`] is initialized once per process, which
//! runs startup recovery, then receives at most one [`BuildInformation`]
//! per build. Implementations must be `Send + Sync` so the dispatcher can
//! hold them behind a trait object.
//!
//! # Lifecycle
//!
//! 1. [`initialize`](BuildInformationRepository::initialize): remove
//!    partial builds left by interrupted runs.
//! 2. [`save`](BuildInformationRepository::save): persist a completed
//!    build atomically.
//! 3. [`clean_up`](BuildInformationRepository::clean_up): release the
//!    store. Safe to call without `initialize` and more than once.

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::build::BuildInformation;
use crate::error::Result;

/// What the repository knows about the process starting up.
#[derive(Debug, Clone)]
pub struct StartupContext {
    /// Wall clock at startup; recovery only removes builds started before
    /// this day.
    pub now: DateTime<Local>,
}

impl StartupContext {
    pub fn now() -> Self {
        Self { now: Local::now() }
    }

    pub fn at(now: DateTime<Local>) -> Self {
        Self { now }
    }
}

impl Default for StartupContext {
    fn default() -> Self {
        Self::now()
    }
}

#[async_trait]
pub trait BuildInformationRepository: Send + Sync {
    /// Prepare the store and delete orphaned partial builds.
    ///
    /// Returns the number of orphaned builds removed.
    async fn initialize(&self, context: &StartupContext) -> Result<u64>;

    /// Persist the full build in one transaction: machine info, build row,
    /// every project, every plugin and every plugin execution, or nothing.
    async fn save(&self, build: &BuildInformation) -> Result<()>;

    /// Release the underlying store.
    async fn clean_up(&self) -> Result<()>;
}
