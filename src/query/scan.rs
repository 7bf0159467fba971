//! Block scans

use std::io;
use std::path::Path;

use crossbeam::channel;
use tracing::debug;

use crate::address::Address;
use crate::error::{GitDbError, Result};
use crate::storage::{list_blocks, BlockFile, RecordPayload};

/// One record found by a scan
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    /// Full record address
    pub id: String,

    pub payload: RecordPayload,
}

/// Read every block of a dataset in block order
pub fn scan(dataset_dir: &Path, dataset: &str) -> Result<Vec<ScannedRecord>> {
    let mut records = Vec::new();
    for (block, path) in list_blocks(dataset_dir)? {
        records.extend(read_block(dataset, &block, &path)?);
    }
    Ok(records)
}

/// Read every block of a dataset using up to `workers` threads
pub fn scan_parallel(dataset_dir: &Path, dataset: &str, workers: usize) -> Result<Vec<ScannedRecord>> {
    let blocks = list_blocks(dataset_dir)?;
    if blocks.is_empty() {
        return Ok(Vec::new());
    }

    let workers = workers.clamp(1, blocks.len());
    debug!(dataset, blocks = blocks.len(), workers, "parallel scan");

    let (job_tx, job_rx) = channel::unbounded();
    for job in blocks {
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let (out_tx, out_rx) = channel::unbounded::<Result<Vec<ScannedRecord>>>();

    crossbeam::thread::scope(|s| -> Result<Vec<ScannedRecord>> {
        for _ in 0..workers {
            let jobs = job_rx.clone();
            let out = out_tx.clone();
            s.spawn(move |_| {
                for (block, path) in jobs.iter() {
                    if out.send(read_block(dataset, &block, &path)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(out_tx);

        let mut merged = Vec::new();
        for partial in out_rx.iter() {
            merged.extend(partial?);
        }
        Ok(merged)
    })
    .map_err(|_| GitDbError::Io(io::Error::new(io::ErrorKind::Other, "scan worker panicked")))?
}

/// Decode one block; a block removed since listing reads as empty
fn read_block(dataset: &str, block: &str, path: &Path) -> Result<Vec<ScannedRecord>> {
    let file = match BlockFile::open(path)? {
        Some(file) => file,
        None => {
            debug!(dataset, block, "block vanished during scan");
            return Ok(Vec::new());
        }
    };

    Ok(file
        .into_entries()
        .into_iter()
        .map(|(record_id, payload)| ScannedRecord {
            id: Address::build(dataset, block, &record_id),
            payload,
        })
        .collect())
}
