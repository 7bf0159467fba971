//! Sync Coordinator
//!
//! Sequences version control calls around store operations and keeps score
//! of sync failures. Pull and push failures never fail the caller's local
//! operation; they put the coordinator in a degraded state instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{Config, PushTarget, User};
use crate::error::{GitDbError, Result};

use super::{VersionControl, OFFLINE_REMOTE, ONLINE_REMOTE};

/// Where the last mutating call ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitState {
    /// Nothing pending
    #[default]
    Clean,

    /// Files changed but the commit failed; the working tree is ahead of
    /// history
    Staged,

    /// Committed locally, nothing to push to
    Committed,

    Pushed,

    /// Committed locally, push failed
    PushFailed,
}

/// Snapshot of sync bookkeeping
#[derive(Debug, Clone, Default)]
pub struct SyncHealth {
    /// Set by any pull/push/commit failure, cleared by the next successful
    /// pull or push
    pub degraded: bool,

    pub pull_failures: u64,
    pub push_failures: u64,
    pub commit_failures: u64,

    pub last_error: Option<String>,
    pub last_state: CommitState,
    pub last_pull: Option<DateTime<Utc>>,
}

struct Remote {
    name: &'static str,
    url: String,
}

pub struct SyncCoordinator {
    repo: PathBuf,
    driver: Arc<dyn VersionControl>,
    online: Option<Remote>,
    offline: Option<Remote>,
    branch: String,
    push_target: PushTarget,
    user: User,
    sync_interval: Duration,

    health: Mutex<SyncHealth>,
    pulled_at: Mutex<Option<Instant>>,
}

impl SyncCoordinator {
    pub fn new(config: &Config, repo: impl Into<PathBuf>) -> Self {
        let remote = |name: &'static str, url: Option<&str>| {
            url.map(|url| Remote {
                name,
                url: url.to_string(),
            })
        };

        Self {
            repo: repo.into(),
            driver: Arc::clone(&config.driver),
            online: remote(ONLINE_REMOTE, config.online_url()),
            offline: remote(OFFLINE_REMOTE, config.offline_url()),
            branch: config.branch.clone(),
            push_target: config.push_target,
            user: config.user.clone(),
            sync_interval: config.sync_interval,
            health: Mutex::new(SyncHealth::default()),
            pulled_at: Mutex::new(None),
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Create the repository on first use and write the ignore file
    ///
    /// Every failure here is a `Setup` error: the store cannot start
    /// without a working copy.
    pub fn init(&self, ignored: &[&str]) -> Result<()> {
        let setup = |e: GitDbError| GitDbError::Setup(e.to_string());

        if !self.driver.is_repository(&self.repo) {
            info!(repo = %self.repo.display(), "initializing repository");

            let remotes: Vec<(&str, &str)> = [&self.online, &self.offline]
                .into_iter()
                .flatten()
                .map(|r| (r.name, r.url.as_str()))
                .collect();
            self.driver
                .init(&self.repo, &self.branch, &remotes)
                .map_err(setup)?;

            // first start: take whatever the shared remote already has
            if let Some(online) = &self.online {
                self.driver
                    .pull(&self.repo, online.name, &self.branch)
                    .map_err(setup)?;
                self.mark_pulled();
            }
        }

        let ignore_file = self.repo.join(".gitignore");
        if !ignore_file.exists() {
            let mut content = ignored.join("\n");
            content.push('\n');
            fs::write(&ignore_file, content).map_err(|e| setup(e.into()))?;
        }

        Ok(())
    }

    /// Pull from the online remote
    ///
    /// A failure is logged and counted, and returned so the caller can tell,
    /// but local state stays usable.
    pub fn pull(&self) -> Result<()> {
        let online = match &self.online {
            Some(online) => online,
            None => return Ok(()),
        };

        match self.driver.pull(&self.repo, online.name, &self.branch) {
            Ok(()) => {
                self.mark_pulled();
                self.health.lock().degraded = false;
                debug!(remote = online.name, "pulled");
                Ok(())
            }
            Err(e) => {
                *self.pulled_at.lock() = Some(Instant::now());
                let mut health = self.health.lock();
                health.pull_failures += 1;
                Err(Self::degrade(&mut health, "pull", online.name, e))
            }
        }
    }

    /// Whether a read should pull first
    pub fn pull_due(&self) -> bool {
        if self.online.is_none() {
            return false;
        }
        match *self.pulled_at.lock() {
            Some(at) => at.elapsed() >= self.sync_interval,
            None => true,
        }
    }

    /// Push to the remotes selected by the push policy
    ///
    /// Every selected remote is attempted; the first failure is returned.
    pub fn push(&self) -> Result<()> {
        let mut first_error = None;

        for remote in self.push_remotes() {
            if let Err(e) = self.driver.push(&self.repo, remote.name, &self.branch) {
                let mut health = self.health.lock();
                health.push_failures += 1;
                let e = Self::degrade(&mut health, "push", remote.name, e);
                first_error.get_or_insert(e);
            } else {
                debug!(remote = remote.name, "pushed");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Commit the working tree as the configured user
    ///
    /// A failed commit leaves the file changes in place; it is logged and
    /// reported as `Staged`.
    pub fn commit(&self, message: &str) -> CommitState {
        let state = match self.driver.commit(&self.repo, message, &self.user) {
            Ok(()) => CommitState::Committed,
            Err(e) => {
                error!(error = %e, message, "commit failed, working tree is ahead of history");
                let mut health = self.health.lock();
                health.commit_failures += 1;
                health.degraded = true;
                health.last_error = Some(e.to_string());
                CommitState::Staged
            }
        };
        self.health.lock().last_state = state;
        state
    }

    /// Commit, then push if there is anywhere to push to
    pub fn commit_and_push(&self, message: &str) -> CommitState {
        let state = self.commit(message);
        if state != CommitState::Committed || self.push_remotes().is_empty() {
            return state;
        }

        let state = match self.push() {
            Ok(()) => {
                self.health.lock().degraded = false;
                CommitState::Pushed
            }
            Err(_) => CommitState::PushFailed,
        };
        self.health.lock().last_state = state;
        state
    }

    /// Discard uncommitted changes in the working copy
    pub fn checkout(&self) -> Result<()> {
        self.driver.checkout(&self.repo, ".")
    }

    /// Newest commit time seen on the online remote
    pub fn last_commit_time(&self) -> Result<DateTime<Utc>> {
        let online = self
            .online
            .as_ref()
            .ok_or_else(|| GitDbError::Config("no online remote configured".to_string()))?;
        self.driver.last_commit_time(&self.repo, online.name)
    }

    pub fn has_online(&self) -> bool {
        self.online.is_some()
    }

    /// Whether the push policy includes the online remote
    pub fn pushes_online(&self) -> bool {
        self.push_remotes().iter().any(|r| r.name == ONLINE_REMOTE)
    }

    pub fn health(&self) -> SyncHealth {
        self.health.lock().clone()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn push_remotes(&self) -> Vec<&Remote> {
        let selected = match self.push_target {
            PushTarget::Online => vec![&self.online],
            PushTarget::Offline => vec![&self.offline],
            PushTarget::Both => vec![&self.offline, &self.online],
            PushTarget::Never => vec![],
        };
        selected.into_iter().flatten().collect()
    }

    fn mark_pulled(&self) {
        *self.pulled_at.lock() = Some(Instant::now());
        self.health.lock().last_pull = Some(Utc::now());
    }

    fn degrade(health: &mut SyncHealth, op: &str, remote: &str, e: GitDbError) -> GitDbError {
        warn!(remote, error = %e, "{} failed, continuing with local state", op);
        health.degraded = true;
        health.last_error = Some(e.to_string());
        GitDbError::Sync(format!("{} {}: {}", op, remote, e))
    }
}
