//! # Build Watcher
//!
//! Records per-plugin timing and outcome for every project of a
//! multi-module build and keeps the history in a local SQLite store.
//!
//! The watcher attaches to the build tool's lifecycle callbacks, assembles
//! them into one in-memory build record, and persists that record in a
//! single transaction when the build succeeds. On startup it removes
//! partial builds left behind by runs that were killed.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────────┐   ┌──────────┐
//! │ lifecycle  │──▶│ BuildEvent   │──▶│ BuildInformation  │──▶│  SQLite  │
//! │  events    │   │    Spy       │   │   (aggregate)     │   │ history  │
//! └────────────┘   └──────┬───────┘   └───────────────────┘   └────▲─────┘
//!                         │ init: recovery                          │
//!                         └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bwatch init                       # create the store, drop partial builds
//! bwatch record events.jsonl        # replay a lifecycle event stream
//! bwatch stats                      # what has been recorded
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Identity and value types |
//! | [`events`] | Lifecycle events from the build tool |
//! | [`build`] | In-memory build aggregate |
//! | [`repository`] | Persistence contract |
//! | [`sqlite_repository`] | SQLite persistence engine |
//! | [`recovery`] | Startup removal of partial builds |
//! | [`db`] | Connection management |
//! | [`migrate`] | Schema migrations |
//! | [`scm`] | Source-control revision lookup |
//! | [`spy`] | Lifecycle listener |
//! | [`replay`] | JSON-lines event replay |
//! | [`stats`] | Store statistics |
//! | [`config`] | Configuration |

pub mod build;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod migrate;
pub mod models;
pub mod recovery;
pub mod replay;
pub mod repository;
pub mod scm;
pub mod spy;
pub mod sqlite_repository;
pub mod stats;

pub use error::{Result, WatcherError};
