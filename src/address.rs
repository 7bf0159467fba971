//! Record Addressing
//!
//! Every record lives at `<Dataset>/<Block>/<RecordId>`. The dataset maps to a
//! directory, the block to a file inside it, and the record id to a key in
//! that file.

use std::fmt;

use crate::error::{GitDbError, Result};

/// Separator between the three address segments
pub const SEPARATOR: char = '/';

/// A parsed record address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    dataset: String,
    block: String,
    record_id: String,
}

impl Address {
    /// Build an address from its parts, validating each segment
    pub fn new(
        dataset: impl Into<String>,
        block: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Result<Self> {
        let address = Self {
            dataset: dataset.into(),
            block: block.into(),
            record_id: record_id.into(),
        };

        for segment in [&address.dataset, &address.block, &address.record_id] {
            if segment.is_empty() || segment.contains(SEPARATOR) {
                return Err(GitDbError::Format(format!(
                    "invalid segment {:?} in {}",
                    segment, address
                )));
            }
        }

        Ok(address)
    }

    /// Parse `"Dataset/Block/RecordId"`
    ///
    /// Exactly three non-empty segments are required.
    pub fn parse(id: &str) -> Result<Self> {
        let mut parts = id.split(SEPARATOR);

        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(dataset), Some(block), Some(record_id), None)
                if !dataset.is_empty() && !block.is_empty() && !record_id.is_empty() =>
            {
                Ok(Self {
                    dataset: dataset.to_string(),
                    block: block.to_string(),
                    record_id: record_id.to_string(),
                })
            }
            _ => Err(GitDbError::Format(format!(
                "expected Dataset/Block/RecordId, got {:?}",
                id
            ))),
        }
    }

    /// Join three segments into an id string (inverse of `parse`)
    pub fn build(dataset: &str, block: &str, record_id: &str) -> String {
        format!("{dataset}{SEPARATOR}{block}{SEPARATOR}{record_id}")
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn block(&self) -> &str {
        &self.block
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// `Dataset/Block`, the block file's path relative to the data directory
    /// (minus extension)
    pub fn block_id(&self) -> String {
        format!("{}{}{}", self.dataset, SEPARATOR, self.block)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::build(&self.dataset, &self.block, &self.record_id))
    }
}

impl std::str::FromStr for Address {
    type Err = GitDbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
