//! Storage Module
//!
//! Persistent record storage using sharded JSON block files.
//!
//! ## Responsibilities
//! - Map addresses to block files on disk
//! - Encode records in a versioned payload
//! - Replace block files atomically so scans never see half-written data
//! - Choose the insert block for auto-blocked datasets (rollover)
//!
//! ## File Format
//! ```text
//! data/{Dataset}/{Block}.json
//! {
//!   "20190201010101.000000001": {
//!     "version": "v2",
//!     "indexes": { "From": "alice@example.com" },
//!     "data": { ...model fields... }        (a string when sealed)
//!   },
//!   ...
//! }
//! ```
//! Legacy (v1) entries hold the bare model object with no envelope.

mod allocator;
mod block;
mod cipher;
mod record;

pub use allocator::BlockAllocator;
pub use block::{list_blocks, list_datasets, BlockFile, BLOCK_EXTENSION};
pub use cipher::{PayloadCipher, Plaintext};
pub use record::{Envelope, PayloadVersion, RecordPayload};
