//! Tests for record addressing and record id derivation
//!
//! These tests verify:
//! - Parsing ids into Dataset/Block/RecordId
//! - Rejection of malformed ids
//! - Timestamp-derived record ids
//! - Schema validation

use chrono::{TimeZone, Utc};
use gitdb::{record_id_from_time, Address, AutoBlock, BlockSpec, GitDbError, Schema};

// =============================================================================
// Parse Tests
// =============================================================================

#[test]
fn test_parse_valid_id() {
    let address = Address::parse("Message/b0/20190201010101.000000001").unwrap();

    assert_eq!(address.dataset(), "Message");
    assert_eq!(address.block(), "b0");
    assert_eq!(address.record_id(), "20190201010101.000000001");
    assert_eq!(address.block_id(), "Message/b0");
}

#[test]
fn test_parse_display_roundtrip() {
    let id = "Message/201902/20190201010101";
    let address: Address = id.parse().unwrap();
    assert_eq!(address.to_string(), id);
    assert_eq!(Address::build("Message", "201902", "20190201010101"), id);
}

#[test]
fn test_parse_rejects_wrong_segment_count() {
    for id in ["", "Message", "Message/b0", "a/b/c/d", "Message/b0/x/"] {
        let result = Address::parse(id);
        assert!(
            matches!(result, Err(GitDbError::Format(_))),
            "expected format error for {:?}",
            id
        );
    }
}

#[test]
fn test_parse_rejects_empty_segments() {
    for id in ["/b0/x", "Message//x", "Message/b0/", "//"] {
        assert!(matches!(Address::parse(id), Err(GitDbError::Format(_))), "{:?}", id);
    }
}

#[test]
fn test_new_validates_segments() {
    assert!(Address::new("Message", "b0", "1").is_ok());
    assert!(matches!(Address::new("Message", "b/0", "1"), Err(GitDbError::Format(_))));
    assert!(matches!(Address::new("", "b0", "1"), Err(GitDbError::Format(_))));
}

#[test]
fn test_addresses_order_by_segments() {
    let a = Address::parse("Message/b0/2").unwrap();
    let b = Address::parse("Message/b1/1").unwrap();
    assert!(a < b);
}

// =============================================================================
// Record Id Tests
// =============================================================================

#[test]
fn test_record_id_from_time_with_nanos() {
    let at = Utc.with_ymd_and_hms(2019, 2, 1, 1, 1, 1).unwrap() + chrono::Duration::nanoseconds(1);
    assert_eq!(record_id_from_time(at), "20190201010101.000000001");
}

#[test]
fn test_record_id_from_time_trims_trailing_zeros() {
    let base = Utc.with_ymd_and_hms(2019, 2, 1, 1, 1, 1).unwrap();

    assert_eq!(record_id_from_time(base), "20190201010101");
    assert_eq!(
        record_id_from_time(base + chrono::Duration::milliseconds(500)),
        "20190201010101.5"
    );
    assert_eq!(
        record_id_from_time(base + chrono::Duration::microseconds(120)),
        "20190201010101.00012"
    );
}

// =============================================================================
// Schema Tests
// =============================================================================

#[test]
fn test_schema_builder() {
    let schema = Schema::new("Message", AutoBlock::new(1000, 10), "1")
        .index("From", "alice@example.com")
        .index("Priority", 3);

    assert_eq!(schema.dataset(), "Message");
    assert_eq!(schema.block(), &BlockSpec::Auto(AutoBlock::new(1000, 10)));
    assert_eq!(schema.record_id(), "1");
    assert_eq!(schema.indexes().len(), 2);
    assert_eq!(schema.indexes()["Priority"], 3);
    assert!(schema.validate().is_ok());
}

#[test]
fn test_schema_named_block() {
    let schema = Schema::new("Note", "201902", "1");
    assert_eq!(schema.block(), &BlockSpec::Named("201902".to_string()));
    assert!(schema.validate().is_ok());
}

#[test]
fn test_schema_validate_rejects_bad_segments() {
    let cases = [
        Schema::new("", "b", "1"),
        Schema::new("A/B", "b", "1"),
        Schema::new("Note", "", "1"),
        Schema::new("Note", "20/19", "1"),
        Schema::new("Note", "b", ""),
        Schema::new(".gitdb", "b", "1"),
        Schema::new("Note", "b", "1").index("", 1),
        Schema::new("Note", "b", "1").index("a/b", 1),
    ];

    for schema in cases {
        assert!(
            matches!(schema.validate(), Err(GitDbError::Schema(_))),
            "expected schema error for {:?}",
            schema
        );
    }
}
