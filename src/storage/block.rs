//! Block files
//!
//! A block is one JSON object mapping record ids to payloads. Blocks are
//! rewritten whole: the new content goes to a temp file in the same
//! directory, which is then renamed over the old file.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{GitDbError, Result};

use super::{BlockAllocator, RecordPayload};

/// Extension of block files
pub const BLOCK_EXTENSION: &str = "json";

/// In-memory copy of a block file
#[derive(Debug, Clone)]
pub struct BlockFile {
    path: PathBuf,
    entries: BTreeMap<String, RecordPayload>,
}

impl BlockFile {
    /// `{data_dir}/{dataset}/{block}.json`
    pub fn path_for(data_dir: &Path, dataset: &str, block: &str) -> PathBuf {
        data_dir
            .join(dataset)
            .join(format!("{}.{}", block, BLOCK_EXTENSION))
    }

    /// Empty block that will be created at `path` on save
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read a block file; `Ok(None)` if it does not exist
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entries = if bytes.iter().all(u8::is_ascii_whitespace) {
            BTreeMap::new()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| GitDbError::parse_at(path, e))?
        };

        Ok(Some(Self {
            path: path.to_path_buf(),
            entries,
        }))
    }

    /// Read a block file, or start an empty one if it does not exist
    pub fn open_or_empty(path: &Path) -> Result<Self> {
        Ok(Self::open(path)?.unwrap_or_else(|| Self::empty(path)))
    }

    /// Write the block atomically, creating parent directories as needed
    ///
    /// Returns the number of bytes written.
    pub fn save(&self) -> Result<u64> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| GitDbError::Config(format!("no parent for {}", self.path.display())))?;
        fs::create_dir_all(dir)?;

        let bytes = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| GitDbError::parse_at(&self.path, e))?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(bytes.len() as u64)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, record_id: &str) -> Option<&RecordPayload> {
        self.entries.get(record_id)
    }

    /// Insert or overwrite an entry
    pub fn insert(&mut self, record_id: impl Into<String>, payload: RecordPayload) {
        self.entries.insert(record_id.into(), payload);
    }

    pub fn remove(&mut self, record_id: &str) -> Option<RecordPayload> {
        self.entries.remove(record_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordPayload)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> BTreeMap<String, RecordPayload> {
        self.entries
    }
}

// =============================================================================
// Directory listing
// =============================================================================

/// Block files of a dataset, in block order
///
/// Auto blocks (`b0`, `b1`, ...) sort numerically and come before named
/// blocks, which sort lexically. A missing dataset directory yields no blocks.
pub fn list_blocks(dataset_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let read_dir = match fs::read_dir(dataset_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut blocks = Vec::new();
    for entry in read_dir {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(BLOCK_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if !stem.starts_with('.') {
                blocks.push((stem.to_string(), path.clone()));
            }
        }
    }

    blocks.sort_by(|(a, _), (b, _)| compare_blocks(a, b));
    Ok(blocks)
}

/// Dataset directories under the data directory (hidden entries skipped)
pub fn list_datasets(data_dir: &Path) -> Result<Vec<String>> {
    let read_dir = match fs::read_dir(data_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut datasets = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                datasets.push(name.to_string());
            }
        }
    }

    datasets.sort();
    Ok(datasets)
}

fn compare_blocks(a: &str, b: &str) -> Ordering {
    match (BlockAllocator::parse_block(a), BlockAllocator::parse_block(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
