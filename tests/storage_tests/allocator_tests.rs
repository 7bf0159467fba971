//! Tests for BlockAllocator

use std::collections::BTreeMap;
use std::path::Path;

use gitdb::storage::{BlockAllocator, BlockFile, Plaintext, RecordPayload};
use gitdb::AutoBlock;
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_block(dir: &Path, name: &str, records: usize, body: &str) {
    let mut block = BlockFile::empty(dir.join(format!("{}.json", name)));
    for n in 0..records {
        let payload =
            RecordPayload::seal(BTreeMap::new(), json!({ "body": body }), None, &Plaintext).unwrap();
        block.insert(n.to_string(), payload);
    }
    block.save().unwrap();
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_block_names() {
    assert_eq!(BlockAllocator::block_name(0), "b0");
    assert_eq!(BlockAllocator::block_name(42), "b42");

    assert_eq!(BlockAllocator::parse_block("b42"), Some(42));
    assert_eq!(BlockAllocator::parse_block("b"), None);
    assert_eq!(BlockAllocator::parse_block("b-1"), None);
    assert_eq!(BlockAllocator::parse_block("201902"), None);
    assert_eq!(BlockAllocator::parse_block("bx1"), None);
}

// =============================================================================
// Rollover Tests
// =============================================================================

#[test]
fn test_first_block_is_b0() {
    let temp = TempDir::new().unwrap();
    let limits = AutoBlock::new(1000, 10);

    assert_eq!(BlockAllocator::next_block(temp.path(), limits).unwrap(), "b0");
    assert_eq!(
        BlockAllocator::next_block(&temp.path().join("missing"), limits).unwrap(),
        "b0"
    );
}

#[test]
fn test_stays_in_block_under_limits() {
    let temp = TempDir::new().unwrap();
    write_block(temp.path(), "b0", 2, "x");

    let next = BlockAllocator::next_block(temp.path(), AutoBlock::new(10_000, 3)).unwrap();
    assert_eq!(next, "b0");
}

#[test]
fn test_rolls_over_at_record_limit() {
    let temp = TempDir::new().unwrap();
    write_block(temp.path(), "b0", 3, "x");

    let next = BlockAllocator::next_block(temp.path(), AutoBlock::new(10_000, 3)).unwrap();
    assert_eq!(next, "b1");
}

#[test]
fn test_rolls_over_at_byte_limit() {
    let temp = TempDir::new().unwrap();
    write_block(temp.path(), "b0", 1, &"x".repeat(200));

    let next = BlockAllocator::next_block(temp.path(), AutoBlock::new(100, 1000)).unwrap();
    assert_eq!(next, "b1");
}

#[test]
fn test_empty_block_admits_any_record() {
    let temp = TempDir::new().unwrap();
    write_block(temp.path(), "b0", 0, "");

    let next = BlockAllocator::next_block(temp.path(), AutoBlock::new(0, 0)).unwrap();
    assert_eq!(next, "b0");
}

#[test]
fn test_only_highest_block_is_considered() {
    let temp = TempDir::new().unwrap();
    write_block(temp.path(), "b0", 1, "x");
    write_block(temp.path(), "b7", 3, "x");
    write_block(temp.path(), "201902", 0, "");

    let next = BlockAllocator::next_block(temp.path(), AutoBlock::new(10_000, 3)).unwrap();
    assert_eq!(next, "b8");
}
