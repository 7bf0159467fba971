//! Version Control Module
//!
//! The working copy under `data/` is a version-controlled tree. Commits give
//! durability; pulls and pushes stand in for replication.
//!
//! ## Responsibilities
//! - Capability trait over the version control system (`VersionControl`)
//! - Subprocess realization over the `git` binary (`GitBinary`)
//! - In-process realization for embedding and tests (`MemoryDriver`)
//! - Commit/push sequencing and degraded-state tracking (`SyncCoordinator`)
//!
//! ## Commit State Machine (per mutating call)
//! ```text
//! Clean ──► Staged ──► Committed ──┬──► Pushed
//!                                  └──► PushFailed  (local write still succeeds)
//! ```

mod git;
mod memory;
mod sync;

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::User;
use crate::error::Result;

pub use git::GitBinary;
pub use memory::{MemoryCommit, MemoryDriver, PullHook};
pub use sync::{CommitState, SyncCoordinator, SyncHealth};

/// Name of the shared remote
pub const ONLINE_REMOTE: &str = "online";

/// Name of the local-only remote
pub const OFFLINE_REMOTE: &str = "offline";

/// Capabilities the store needs from a version control system
///
/// Every call names the working copy it operates on, so one driver can serve
/// several stores.
pub trait VersionControl: Send + Sync + fmt::Debug {
    /// Whether `repo` already holds a repository
    fn is_repository(&self, repo: &Path) -> bool;

    /// Create a repository on `branch` and register `(name, url)` remotes
    fn init(&self, repo: &Path, branch: &str, remotes: &[(&str, &str)]) -> Result<()>;

    /// Fetch and merge `branch` from `remote`
    fn pull(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Publish local commits on `branch` to `remote`
    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Stage everything and commit it as `author`
    ///
    /// A clean tree is not an error.
    fn commit(&self, repo: &Path, message: &str, author: &User) -> Result<()>;

    /// Discard uncommitted changes under `pathspec`
    fn checkout(&self, repo: &Path, pathspec: &str) -> Result<()>;

    /// Time of the newest commit seen on `remote`
    fn last_commit_time(&self, repo: &Path, remote: &str) -> Result<DateTime<Utc>>;
}
