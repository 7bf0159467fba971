//! Index maintenance and lookup tests

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use gitdb::index::IndexCache;
use gitdb::storage::{BlockFile, RecordPayload};
use gitdb::{Config, GitDbError, MemoryDriver, Registry, Store};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::common::*;

fn criteria(pairs: &[(&str, &str)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

fn write_legacy(store: &Store, msg: &Message, record_id: &str) {
    let path = store.block_path("Message", "b0");
    let mut block = BlockFile::open_or_empty(&path).unwrap();
    block.insert(record_id, RecordPayload::Legacy(serde_json::to_value(msg).unwrap()));
    block.save().unwrap();
}

// =============================================================================
// Write Path Tests
// =============================================================================

#[test]
fn test_insert_updates_index_files() {
    let (_temp, store, _driver) = setup_temp_store();

    let id = store.insert(&mut message(1, "alice@example.com", "x")).unwrap();

    let from = IndexCache::read_index(&store.index_path("Message", "From"));
    assert_eq!(from.get(&id), Some(&json!("alice@example.com")));

    let to = IndexCache::read_index(&store.index_path("Message", "To"));
    assert_eq!(to.get(&id), Some(&json!("bob@example.com")));
}

#[test]
fn test_index_files_are_tab_indented() {
    let (_temp, store, _driver) = setup_temp_store();

    let id = store.insert(&mut message(1, "alice@example.com", "x")).unwrap();

    let text = fs::read_to_string(store.index_path("Message", "From")).unwrap();
    assert_eq!(text, format!("{{\n\t\"{}\": \"alice@example.com\"\n}}", id));
}

#[test]
fn test_index_files_live_under_internal_dir() {
    let (_temp, store, _driver) = setup_temp_store();

    store.insert(&mut message(1, "alice@example.com", "x")).unwrap();

    let expected = store.data_dir().join(".gitdb/index/Message/From.json");
    assert_eq!(store.index_path("Message", "From"), expected);
    assert!(expected.exists());
}

#[test]
fn test_delete_prunes_index_entries() {
    let (_temp, store, _driver) = setup_temp_store();

    let keep = store.insert(&mut message(1, "alice@example.com", "keep")).unwrap();
    let gone = store.insert(&mut message(2, "alice@example.com", "gone")).unwrap();

    store.delete(&gone).unwrap();

    let from = IndexCache::read_index(&store.index_path("Message", "From"));
    assert!(from.contains_key(&keep));
    assert!(!from.contains_key(&gone));

    let to = IndexCache::read_index(&store.index_path("Message", "To"));
    assert!(!to.contains_key(&gone));
}

// =============================================================================
// GetModel Tests
// =============================================================================

#[test]
fn test_get_model_exact_match() {
    let (_temp, store, _driver) = setup_temp_store();

    store.insert(&mut message(1, "alice@example.com", "from alice")).unwrap();
    store.insert(&mut message(2, "carol@example.com", "from carol")).unwrap();

    let found: Message = store
        .get_model(&criteria(&[("From", "carol@example.com")]))
        .unwrap();
    assert_eq!(found.body, "from carol");
    assert_eq!(found.base.id(), "Message/b0/20190201010101.000000002");
}

#[test]
fn test_get_model_first_in_address_order() {
    let (_temp, store, _driver) = setup_temp_store();

    store.insert(&mut message(9, "alice@example.com", "later")).unwrap();
    store.insert(&mut message(3, "alice@example.com", "earlier")).unwrap();

    let found: Message = store
        .get_model(&criteria(&[("From", "alice@example.com")]))
        .unwrap();
    assert_eq!(found.body, "earlier");
}

#[test]
fn test_get_model_requires_every_criterion() {
    let (_temp, store, _driver) = setup_temp_store();

    let mut to_dave = message(1, "alice@example.com", "to dave");
    to_dave.to = "dave@example.com".to_string();
    store.insert(&mut to_dave).unwrap();
    store.insert(&mut message(2, "alice@example.com", "to bob")).unwrap();

    let found: Message = store
        .get_model(&criteria(&[("From", "alice@example.com"), ("To", "bob@example.com")]))
        .unwrap();
    assert_eq!(found.body, "to bob");

    let none = store.get_model::<Message>(&criteria(&[
        ("From", "carol@example.com"),
        ("To", "bob@example.com"),
    ]));
    assert!(matches!(none, Err(GitDbError::NotFound(_))));
}

#[test]
fn test_get_model_no_match() {
    let (_temp, store, _driver) = setup_temp_store();

    store.insert(&mut message(1, "alice@example.com", "x")).unwrap();

    let result = store.get_model::<Message>(&criteria(&[("From", "nobody@example.com")]));
    assert!(matches!(result, Err(GitDbError::NotFound(_))));

    // Body is not indexed
    let result = store.get_model::<Message>(&criteria(&[("Body", "x")]));
    assert!(matches!(result, Err(GitDbError::NotFound(_))));
}

#[test]
fn test_get_model_builds_missing_index() {
    let (_temp, store, _driver) = setup_temp_store();

    store.insert(&mut message(1, "alice@example.com", "indexed")).unwrap();
    fs::remove_dir_all(store.data_dir().join(".gitdb/index/Message")).unwrap();
    store.discard_uncommitted().unwrap();

    let found: Message = store
        .get_model(&criteria(&[("From", "alice@example.com")]))
        .unwrap();
    assert_eq!(found.body, "indexed");
    assert!(store.index_path("Message", "From").exists());
}

#[test]
fn test_get_model_skips_stale_entries() {
    let (_temp, store, _driver) = setup_temp_store();

    let stale = store.insert(&mut message(1, "alice@example.com", "stale")).unwrap();
    store.insert(&mut message(2, "alice@example.com", "live")).unwrap();

    // remove the record behind the index's back
    let path = store.block_path("Message", "b0");
    let mut block = BlockFile::open(&path).unwrap().unwrap();
    block.remove(gitdb::Address::parse(&stale).unwrap().record_id());
    block.save().unwrap();

    let found: Message = store
        .get_model(&criteria(&[("From", "alice@example.com")]))
        .unwrap();
    assert_eq!(found.body, "live");
}

#[test]
fn test_get_model_without_indexed_fields() {
    let (_temp, store, driver) = setup_temp_store();

    let mut note = Note {
        text: "plain".to_string(),
        ..Default::default()
    };
    store.insert(&mut note).unwrap();
    let commits = driver.commits().len();

    for _ in 0..2 {
        let result = store.get_model::<Note>(&criteria(&[("text", "plain")]));
        assert!(matches!(result, Err(GitDbError::NotFound(_))));
    }

    // no rebuild, no commit
    assert_eq!(driver.commits().len(), commits);
    assert!(!store.data_dir().join(".gitdb/index/Note").exists());
}

#[test]
fn test_get_model_empty_dataset_does_not_commit() {
    let (_temp, store, driver) = setup_temp_store();
    let commits = driver.commits().len();

    let result = store.get_model::<Ticket>(&criteria(&[("title", "ticket 1")]));
    assert!(matches!(result, Err(GitDbError::NotFound(_))));
    assert_eq!(driver.commits().len(), commits);
}

// =============================================================================
// Rebuild Tests
// =============================================================================

#[test]
fn test_rebuild_is_byte_identical() {
    let (_temp, store, _driver) = setup_temp_store();

    for n in 1..=5 {
        store.insert(&mut message(n, &format!("user{}@example.com", n % 2), "x")).unwrap();
    }

    store.build_index().unwrap();
    let first = fs::read(store.index_path("Message", "From")).unwrap();

    store.build_index().unwrap();
    let second = fs::read(store.index_path("Message", "From")).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_rebuild_matches_write_path() {
    let (_temp, store, _driver) = setup_temp_store();

    for n in 1..=4 {
        store.insert(&mut message(n, "alice@example.com", "x")).unwrap();
    }
    let before = fs::read(store.index_path("Message", "To")).unwrap();

    store.build_index().unwrap();
    let after = fs::read(store.index_path("Message", "To")).unwrap();

    assert_eq!(before, after);
}

#[test]
fn test_rebuild_drops_entries_for_removed_records() {
    let (_temp, store, _driver) = setup_temp_store();

    let id = store.insert(&mut message(1, "alice@example.com", "x")).unwrap();
    fs::remove_file(store.block_path("Message", "b0")).unwrap();

    store.build_index().unwrap();

    let from = IndexCache::read_index(&store.index_path("Message", "From"));
    assert!(!from.contains_key(&id));
}

#[test]
fn test_corrupt_index_file_recovers() {
    let (_temp, store, _driver) = setup_temp_store();

    let first = store.insert(&mut message(1, "alice@example.com", "x")).unwrap();
    store.discard_uncommitted().unwrap();
    fs::write(store.index_path("Message", "From"), "{ broken").unwrap();

    // a corrupt file reads as empty and is rewritten on the next update
    let second = store.insert(&mut message(2, "alice@example.com", "y")).unwrap();
    let from = IndexCache::read_index(&store.index_path("Message", "From"));
    assert!(from.contains_key(&second));
    assert!(!from.contains_key(&first));

    store.build_index().unwrap();
    let from = IndexCache::read_index(&store.index_path("Message", "From"));
    assert!(from.contains_key(&first));
    assert!(from.contains_key(&second));
}

#[test]
fn test_legacy_records_indexed_through_registry() {
    let (_temp, store, _driver) = setup_temp_store();

    write_legacy(&store, &message(1, "legacy@example.com", "old"), "20190201010101.000000001");
    store.build_index().unwrap();

    let from = IndexCache::read_index(&store.index_path("Message", "From"));
    assert_eq!(
        from.get("Message/b0/20190201010101.000000001"),
        Some(&json!("legacy@example.com"))
    );

    let found: Message = store
        .get_model(&criteria(&[("From", "legacy@example.com")]))
        .unwrap();
    assert_eq!(found.body, "old");
}

#[test]
fn test_unregistered_legacy_dataset_does_not_fail_rebuild() {
    let temp = TempDir::new().unwrap();
    let driver = Arc::new(MemoryDriver::new());
    let config = Config::builder()
        .db_path(temp.path())
        .driver(driver.clone())
        .registry(Registry::new())
        .build();
    let store = Store::open(config).unwrap();

    write_legacy(&store, &message(1, "legacy@example.com", "old"), "20190201010101.000000001");
    store.insert(&mut ticket(1)).unwrap();

    // Message is skipped, Ticket is still indexed
    store.build_index().unwrap();
    assert!(!store.index_path("Message", "From").exists());
    assert!(store.index_path("Ticket", "title").exists());
}

#[test]
fn test_open_builds_index_once() {
    let temp = TempDir::new().unwrap();
    let driver = Arc::new(MemoryDriver::new());

    {
        let store = Store::open(test_config(&temp, &driver)).unwrap();
        store.insert(&mut message(1, "alice@example.com", "x")).unwrap();
    }
    let marker = temp.path().join("data/.gitdb/index.built");
    assert!(marker.exists());
    let stamp = fs::read_to_string(&marker).unwrap();

    let _store = Store::open(test_config(&temp, &driver)).unwrap();
    assert_eq!(fs::read_to_string(&marker).unwrap(), stamp);

    let rebuilds = driver
        .commits()
        .iter()
        .filter(|c| c.message == "Rebuilt indexes")
        .count();
    assert_eq!(rebuilds, 1);
}

#[test]
fn test_open_indexes_existing_records() {
    let temp = TempDir::new().unwrap();
    let driver = Arc::new(MemoryDriver::new());
    let store = Store::open(test_config(&temp, &driver)).unwrap();
    let id = store.insert(&mut message(1, "alice@example.com", "x")).unwrap();
    drop(store);

    // a fresh clone has records but no local index state
    fs::remove_dir_all(temp.path().join("data/.gitdb")).unwrap();

    let store = Store::open(test_config(&temp, &driver)).unwrap();
    let from = IndexCache::read_index(&store.index_path("Message", "From"));
    assert!(from.contains_key(&id));
}
