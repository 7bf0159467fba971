//! Index Module
//!
//! Derived lookup tables for exact-match queries.
//!
//! ## Responsibilities
//! - Keep one map per (dataset, field): record address → field value
//! - Load index files lazily and write back only what changed
//! - Degrade to an empty index when a file is missing or corrupt
//! - Rebuild from block files at any time (indexes are never a source of truth)
//!
//! ## File Format
//! ```text
//! data/.gitdb/index/{Dataset}/{Field}.json
//! {
//! 	"Message/b0/20190201010101.000000001": "alice@example.com"
//! }
//! ```

mod cache;

pub use cache::{Index, IndexCache};
