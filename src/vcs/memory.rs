//! In-process driver
//!
//! Keeps a log of commits and sync calls in memory instead of touching a
//! real repository. Failures can be switched on per operation to exercise
//! degraded sync paths.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::User;
use crate::error::{GitDbError, Result};

use super::VersionControl;

/// A commit recorded by [`MemoryDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCommit {
    pub message: String,
    pub author: User,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    repos: HashSet<PathBuf>,
    remotes: Vec<(String, String)>,
    commits: Vec<MemoryCommit>,
    pulls: Vec<String>,
    pushes: Vec<String>,
    checkouts: usize,
    remote_time: Option<DateTime<Utc>>,

    fail_init: bool,
    fail_pull: bool,
    fail_push: bool,
    fail_commit: bool,
}

/// Called with the repository path on every successful pull
pub type PullHook = Arc<dyn Fn(&Path) + Send + Sync>;

#[derive(Default)]
pub struct MemoryDriver {
    state: Mutex<MemoryState>,
    pull_hook: Mutex<Option<PullHook>>,
}

impl fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("state", &*self.state.lock())
            .field("pull_hook", &self.pull_hook.lock().is_some())
            .finish()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_init(&self, fail: bool) {
        self.state.lock().fail_init = fail;
    }

    pub fn fail_pulls(&self, fail: bool) {
        self.state.lock().fail_pull = fail;
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.state.lock().fail_push = fail;
    }

    pub fn fail_commits(&self, fail: bool) {
        self.state.lock().fail_commit = fail;
    }

    /// Run `hook` on each successful pull, standing in for the files a merge
    /// would change
    pub fn on_pull(&self, hook: impl Fn(&Path) + Send + Sync + 'static) {
        *self.pull_hook.lock() = Some(Arc::new(hook));
    }

    /// Pretend the remote's newest commit happened at `at`
    pub fn set_remote_time(&self, at: DateTime<Utc>) {
        self.state.lock().remote_time = Some(at);
    }

    pub fn commits(&self) -> Vec<MemoryCommit> {
        self.state.lock().commits.clone()
    }

    pub fn remotes(&self) -> Vec<(String, String)> {
        self.state.lock().remotes.clone()
    }

    /// Remotes pulled from, in call order (failed attempts included)
    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().pulls.clone()
    }

    /// Remotes pushed to, in call order (failed attempts included)
    pub fn pushes(&self) -> Vec<String> {
        self.state.lock().pushes.clone()
    }

    pub fn checkouts(&self) -> usize {
        self.state.lock().checkouts
    }
}

impl VersionControl for MemoryDriver {
    fn is_repository(&self, repo: &Path) -> bool {
        self.state.lock().repos.contains(repo)
    }

    fn init(&self, repo: &Path, _branch: &str, remotes: &[(&str, &str)]) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_init {
            return Err(GitDbError::Sync("init failed".to_string()));
        }

        std::fs::create_dir_all(repo)?;
        state.repos.insert(repo.to_path_buf());
        state.remotes.extend(
            remotes
                .iter()
                .map(|(name, url)| (name.to_string(), url.to_string())),
        );
        Ok(())
    }

    fn pull(&self, repo: &Path, remote: &str, _branch: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.pulls.push(remote.to_string());
            if state.fail_pull {
                return Err(GitDbError::Sync(format!("cannot reach {}", remote)));
            }
        }

        let hook = self.pull_hook.lock().clone();
        if let Some(hook) = hook {
            hook(repo);
        }
        Ok(())
    }

    fn push(&self, _repo: &Path, remote: &str, _branch: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.pushes.push(remote.to_string());
        if state.fail_push {
            return Err(GitDbError::Sync(format!("cannot reach {}", remote)));
        }
        Ok(())
    }

    fn commit(&self, _repo: &Path, message: &str, author: &User) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_commit {
            return Err(GitDbError::Sync("commit failed".to_string()));
        }
        state.commits.push(MemoryCommit {
            message: message.to_string(),
            author: author.clone(),
            at: Utc::now(),
        });
        Ok(())
    }

    fn checkout(&self, _repo: &Path, _pathspec: &str) -> Result<()> {
        self.state.lock().checkouts += 1;
        Ok(())
    }

    fn last_commit_time(&self, _repo: &Path, remote: &str) -> Result<DateTime<Utc>> {
        self.state
            .lock()
            .remote_time
            .ok_or_else(|| GitDbError::Sync(format!("no commits seen on remote {}", remote)))
    }
}
