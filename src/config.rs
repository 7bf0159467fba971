//! Configuration for GitDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::model::Registry;
use crate::storage::{PayloadCipher, Plaintext};
use crate::vcs::{GitBinary, VersionControl};

/// Main configuration for a GitDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the store
    /// Internal structure:
    ///   {db_path}/
    ///     └── data/                     (git working copy)
    ///           ├── .gitignore
    ///           ├── .gitdb/index/       (index files)
    ///           └── {Dataset}/{Block}.json
    pub db_path: PathBuf,

    /// Worker threads used by the parallel scan
    pub scan_workers: usize,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    /// Shared remote, pulled before reads and on every sync
    pub online_remote: Option<String>,

    /// Local-only remote; defaults to the online URL when unset
    pub offline_remote: Option<String>,

    /// Branch pulled from and pushed to
    pub branch: String,

    /// Interval between background syncs and minimum age before a read
    /// triggers a pull
    pub sync_interval: Duration,

    /// Which remote(s) receive pushes after a write
    pub push_target: PushTarget,

    /// Version control backend
    pub driver: Arc<dyn VersionControl>,

    /// Identity written into commits
    pub user: User,

    // -------------------------------------------------------------------------
    // Model Configuration
    // -------------------------------------------------------------------------
    /// Key handed to the cipher; payloads are stored in clear when unset
    pub encryption_key: Option<String>,

    pub cipher: Arc<dyn PayloadCipher>,

    /// Dataset name → model constructor
    pub registry: Registry,

    // -------------------------------------------------------------------------
    // Logging Configuration
    // -------------------------------------------------------------------------
    /// Default verbosity for binaries that install a subscriber
    pub log_level: tracing::Level,
}

/// Push remote selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTarget {
    /// Push to the shared remote
    Online,

    /// Push to the local-only remote
    Offline,

    /// Push to both, offline first
    Both,

    /// Never push; commits stay local
    Never,
}

/// Commit author identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new("GitDB", "gitdb@localhost")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./gitdb_data"),
            scan_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            online_remote: None,
            offline_remote: None,
            branch: "master".to_string(),
            sync_interval: Duration::from_secs(120),
            push_target: PushTarget::Online,
            driver: Arc::new(GitBinary::default()),
            user: User::default(),
            encryption_key: None,
            cipher: Arc::new(Plaintext),
            registry: Registry::new(),
            log_level: tracing::Level::INFO,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding the git working copy
    pub fn data_dir(&self) -> PathBuf {
        self.db_path.join("data")
    }

    /// Offline remote URL, falling back to the online URL
    pub fn offline_url(&self) -> Option<&str> {
        self.offline_remote
            .as_deref()
            .or(self.online_remote.as_deref())
            .filter(|url| !url.is_empty())
    }

    pub fn online_url(&self) -> Option<&str> {
        self.online_remote.as_deref().filter(|url| !url.is_empty())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store root directory
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set the number of parallel scan workers (minimum 1)
    pub fn scan_workers(mut self, workers: usize) -> Self {
        self.config.scan_workers = workers.max(1);
        self
    }

    /// Set the shared remote URL
    pub fn online_remote(mut self, url: impl Into<String>) -> Self {
        self.config.online_remote = Some(url.into());
        self
    }

    /// Set the local-only remote URL
    pub fn offline_remote(mut self, url: impl Into<String>) -> Self {
        self.config.offline_remote = Some(url.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.config.branch = branch.into();
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    pub fn push_target(mut self, target: PushTarget) -> Self {
        self.config.push_target = target;
        self
    }

    /// Set the version control backend
    pub fn driver(mut self, driver: Arc<dyn VersionControl>) -> Self {
        self.config.driver = driver;
        self
    }

    /// Set the committing user
    pub fn user(mut self, user: User) -> Self {
        self.config.user = user;
        self
    }

    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.config.encryption_key = Some(key.into());
        self
    }

    pub fn cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.config.cipher = cipher;
        self
    }

    /// Set the dataset → model registry
    pub fn registry(mut self, registry: Registry) -> Self {
        self.config.registry = registry;
        self
    }

    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
