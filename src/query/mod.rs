//! Query Module
//!
//! Full-dataset scans over block files.
//!
//! ## Responsibilities
//! - Sequential scan in block order (`scan`)
//! - Parallel scan across a bounded worker pool (`scan_parallel`)
//!
//! Both return the same set of records; only the parallel scan may return
//! them in a different order. Workers share nothing while decoding: each one
//! owns the blocks it pulls off the job channel, and the caller's thread
//! merges partial results as they arrive.

mod scan;

pub use scan::{scan, scan_parallel, ScannedRecord};
