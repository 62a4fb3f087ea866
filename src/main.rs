//! # Build Watcher CLI (`bwatch`)
//!
//! ## Usage
//!
//! ```bash
//! bwatch --config ./config/bwatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bwatch init` | Create the store, apply migrations, remove partial builds |
//! | `bwatch record <FILE>` | Record a build from a JSON-lines lifecycle stream (`-` for stdin) |
//! | `bwatch stats` | Summarize the recorded history |
//! | `bwatch revision [DIR]` | Show the source revision detected for a directory |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use build_watcher::config::Config;
use build_watcher::db::DatabaseManager;
use build_watcher::replay;
use build_watcher::repository::{BuildInformationRepository, StartupContext};
use build_watcher::scm::{RevisionProvider, ScmRevisionProvider};
use build_watcher::spy::BuildEventSpy;
use build_watcher::sqlite_repository::SqliteBuildInformationRepository;
use build_watcher::stats;

/// Build Watcher: records plugin execution history of multi-module builds.
#[derive(Parser)]
#[command(name = "bwatch", version)]
struct Cli {
    /// Path to configuration file (TOML). Optional; defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/bwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and remove partial builds left by killed runs.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Record a build from a JSON-lines lifecycle event stream.
    Record {
        /// Event file, or `-` to read from stdin.
        events: PathBuf,
    },

    /// Summarize the recorded history.
    Stats,

    /// Show the source revision detected for a directory.
    Revision {
        #[arg(default_value = ".")]
        directory: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if std::env::var("LOG_FORMAT").unwrap_or_default() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&cfg).await?,
        Commands::Record { events } => run_record(&cfg, &events).await?,
        Commands::Stats => run_stats(&cfg).await?,
        Commands::Revision { directory } => {
            let revision = ScmRevisionProvider::default().determine_revision_of(&directory);
            println!("scm:      {}", revision.scm.as_deref().unwrap_or("(none)"));
            println!("revision: {}", revision.revision.as_deref().unwrap_or("(none)"));
        }
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> Result<()> {
    let repository = SqliteBuildInformationRepository::new(DatabaseManager::shared(cfg));
    let removed = repository
        .initialize(&StartupContext::now())
        .await
        .with_context(|| format!("Failed to initialize {}", cfg.db.path.display()))?;
    repository.clean_up().await?;

    println!("Database initialized: {}", cfg.db.path.display());
    println!("  partial builds removed: {}", removed);
    Ok(())
}

async fn run_record(cfg: &Config, path: &Path) -> Result<()> {
    let events = if path.as_os_str() == "-" {
        replay::parse_events(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open event stream: {}", path.display()))?;
        replay::parse_events(BufReader::new(file))?
    };

    let repository = SqliteBuildInformationRepository::new(DatabaseManager::shared(cfg));
    let mut spy = BuildEventSpy::new(
        Box::new(repository),
        Box::new(ScmRevisionProvider::default()),
        cfg.watcher.build_data.clone(),
    );

    spy.init(&StartupContext::now()).await?;
    let summary = replay::replay(&mut spy, &events).await;
    let save_error = spy.last_save_error().map(str::to_string);
    spy.close().await?;
    let summary = summary?;

    println!("record");
    println!("  events: {}", summary.events);
    match summary.build_id {
        Some(id) => println!("  build: {}", id),
        None => println!("  build: (none, no projects declared)"),
    }
    println!("  saved: {}", summary.saved);
    if let Some(err) = save_error {
        println!("  save error: {}", err);
    }
    Ok(())
}

async fn run_stats(cfg: &Config) -> Result<()> {
    let manager = DatabaseManager::shared(cfg);
    let pool = manager.load().await?;
    let s = stats::collect(&pool).await?;
    manager.unload().await;

    let db_size = std::fs::metadata(&cfg.db.path).map(|m| m.len()).unwrap_or(0);

    println!("Build Watcher: History Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", cfg.db.path.display());
    println!("  Size:        {}", stats::format_bytes(db_size));
    println!();
    println!("  Builds:      {} completed, {} unfinished", s.completed_builds, s.unfinished_builds);
    println!("  Projects:    {}", s.projects);
    println!("  Plugins:     {}", s.plugins);
    println!("  Executions:  {}", s.plugin_executions);
    println!(
        "  Last build:  {}",
        s.last_build_start
            .map(stats::format_millis)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    Ok(())
}
