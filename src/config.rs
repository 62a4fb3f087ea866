//! Configuration for the build watcher.
//!
//! Read from an optional TOML file, then overridden by environment
//! variables so a build can redirect the store or annotate itself without
//! touching the file:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `BUILD_WATCHER_DIRECTORY` | store directory (database file `stats.sqlite` inside) |
//! | `BUILD_WATCHER_BUILD_DATA` | free-form annotation saved with the build |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DIRECTORY_ENV: &str = "BUILD_WATCHER_DIRECTORY";
pub const BUILD_DATA_ENV: &str = "BUILD_WATCHER_BUILD_DATA";
pub const DATABASE_FILE: &str = "stats.sqlite";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    default_directory().join(DATABASE_FILE)
}

fn default_directory() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".build-watcher")
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WatcherConfig {
    /// Annotation stored in `build.data` for every recorded build.
    #[serde(default)]
    pub build_data: Option<String>,
}

impl Config {
    /// Defaults rooted at a given store directory.
    pub fn with_directory(directory: impl AsRef<Path>) -> Self {
        Self {
            db: DbConfig {
                path: directory.as_ref().join(DATABASE_FILE),
            },
            watcher: WatcherConfig::default(),
        }
    }

    /// See [`load_config`].
    pub fn load(path: &Path) -> Result<Self> {
        load_config(path)
    }

    /// Apply the environment overrides.
    pub fn apply_env(mut self) -> Self {
        if let Some(directory) = std::env::var_os(DIRECTORY_ENV).filter(|v| !v.is_empty()) {
            self.db.path = PathBuf::from(directory).join(DATABASE_FILE);
        }
        if let Some(data) = std::env::var(BUILD_DATA_ENV).ok().filter(|v| !v.is_empty()) {
            self.watcher.build_data = Some(data);
        }
        self
    }
}

/// Load the configuration file if present, fall back to defaults, then
/// apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    let config = config.apply_env();
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }
    if config.db.path.is_dir() {
        anyhow::bail!(
            "db.path must point to a database file, not a directory: {}",
            config.db.path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Sets the override variables for the duration of a test and restores
    /// the previous values on drop.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<OsString>)>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut saved = Vec::new();
            for key in [DIRECTORY_ENV, BUILD_DATA_ENV] {
                saved.push((key, std::env::var_os(key)));
                std::env::remove_var(key);
            }
            for (key, value) in vars {
                if let Some(value) = value {
                    std::env::set_var(key, value);
                }
            }
            Self { saved, _lock: lock }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/watcher/stats.sqlite"

            [watcher]
            build_data = "nightly"
            "#,
        )
        .unwrap();
        assert_eq!(config.db.path, PathBuf::from("/tmp/watcher/stats.sqlite"));
        assert_eq!(config.watcher.build_data.as_deref(), Some("nightly"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.db.path.ends_with(DATABASE_FILE));
        assert!(config.watcher.build_data.is_none());
    }

    #[test]
    fn test_load_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bwatch.toml");
        let db = tmp.path().join("data").join("history.sqlite");
        std::fs::write(&path, format!("[db]\npath = {:?}\n", db.display().to_string())).unwrap();

        let _env = EnvGuard::set(&[]);
        let config = load_config(&path).unwrap();
        assert_eq!(config.db.path, db);
    }

    #[test]
    fn test_directory_override() {
        let tmp = TempDir::new().unwrap();
        let directory = tmp.path().join("store");
        let _env = EnvGuard::set(&[(DIRECTORY_ENV, directory.to_str())]);

        let config = Config::with_directory("/var/lib/watcher").apply_env();
        assert_eq!(config.db.path, directory.join(DATABASE_FILE));
        assert!(config.watcher.build_data.is_none());
    }

    #[test]
    fn test_build_data_override() {
        let _env = EnvGuard::set(&[(BUILD_DATA_ENV, Some("nightly"))]);

        let config = Config::with_directory("/var/lib/watcher").apply_env();
        assert_eq!(config.watcher.build_data.as_deref(), Some("nightly"));
        assert_eq!(config.db.path, PathBuf::from("/var/lib/watcher/stats.sqlite"));
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let _env = EnvGuard::set(&[(DIRECTORY_ENV, Some("")), (BUILD_DATA_ENV, Some(""))]);

        let mut config = Config::with_directory("/var/lib/watcher");
        config.watcher.build_data = Some("from-file".into());
        let config = config.apply_env();
        assert_eq!(config.db.path, PathBuf::from("/var/lib/watcher/stats.sqlite"));
        assert_eq!(config.watcher.build_data.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_load_applies_overrides_over_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bwatch.toml");
        std::fs::write(&path, "[watcher]\nbuild_data = \"from-file\"\n").unwrap();
        let directory = tmp.path().join("override");
        let _env = EnvGuard::set(&[
            (DIRECTORY_ENV, directory.to_str()),
            (BUILD_DATA_ENV, Some("from-env")),
        ]);

        let config = load_config(&path).unwrap();
        assert_eq!(config.db.path, directory.join(DATABASE_FILE));
        assert_eq!(config.watcher.build_data.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_rejects_directory_as_db_path() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            db: DbConfig {
                path: tmp.path().to_path_buf(),
            },
            watcher: WatcherConfig::default(),
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_with_directory() {
        let config = Config::with_directory("/var/lib/watcher");
        assert_eq!(config.db.path, PathBuf::from("/var/lib/watcher/stats.sqlite"));
    }
}
