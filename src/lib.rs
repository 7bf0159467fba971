//! # GitDB
//!
//! An embedded document store backed by a git working copy:
//! - Records sharded into bounded JSON block files
//! - Every mutation committed as a version control snapshot
//! - Pull/push to remotes in place of network replication
//! - Exact-match secondary indexes, rebuildable from records
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                                │
//! │            (Single Writer / Multi Reader)                    │
//! └───────┬──────────────────┬──────────────────┬───────────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//!  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//!  │   Storage   │    │ IndexCache  │    │    Sync     │
//!  │  (Blocks)   │    │   (Mutex)   │    │ Coordinator │
//!  └──────┬──────┘    └─────────────┘    └──────┬──────┘
//!         │                                     │
//!         ▼                                     ▼
//!  ┌─────────────┐                       ┌─────────────┐
//!  │    Query    │                       │     VCS     │
//!  │ (Scan Pool) │                       │  (git/mem)  │
//!  └─────────────┘                       └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod address;
pub mod model;
pub mod storage;
pub mod index;
pub mod vcs;
pub mod query;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use address::Address;
pub use config::{Config, PushTarget, User};
pub use error::{GitDbError, Result};
pub use model::{record_id_from_time, AutoBlock, BaseModel, BlockSpec, Model, Registry, Schema};
pub use store::{Store, SyncLoop};
pub use vcs::{CommitState, GitBinary, MemoryDriver, SyncHealth, VersionControl};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of GitDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
