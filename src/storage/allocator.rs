//! Block Allocator (AutoBlock)
//!
//! Picks the insert block for datasets using size/count driven rollover.
//! Only the highest-numbered block is ever an insert target; once it reaches
//! either threshold the next insert opens its successor.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::model::AutoBlock;

use super::{list_blocks, BlockFile};

/// Chooses blocks for auto-blocked datasets
pub struct BlockAllocator;

impl BlockAllocator {
    /// Prefix of auto block names (`b0`, `b1`, ...)
    pub const PREFIX: &'static str = "b";

    /// Block name for sequence number `n`
    pub fn block_name(n: u64) -> String {
        format!("{}{}", Self::PREFIX, n)
    }

    /// Sequence number of an auto block name
    /// "b42" → Some(42)
    pub fn parse_block(name: &str) -> Option<u64> {
        let digits = name.strip_prefix(Self::PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Block that the next insert into `dataset_dir` should target
    ///
    /// The check happens before the insert, so a block may exceed the byte
    /// limit by one record. An empty block always admits the record, however
    /// large it is.
    pub fn next_block(dataset_dir: &Path, limits: AutoBlock) -> Result<String> {
        let current = list_blocks(dataset_dir)?
            .into_iter()
            .filter_map(|(name, path)| Self::parse_block(&name).map(|n| (n, path)))
            .max_by_key(|(n, _)| *n);

        let (n, path) = match current {
            Some(current) => current,
            None => return Ok(Self::block_name(0)),
        };

        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let count = BlockFile::open(&path)?.map(|b| b.len()).unwrap_or(0);

        if count == 0 || (size < limits.max_bytes && count < limits.max_records) {
            return Ok(Self::block_name(n));
        }

        let next = Self::block_name(n + 1);
        debug!(
            block = %next,
            size,
            count,
            "rolling over to new block"
        );
        Ok(next)
    }
}
