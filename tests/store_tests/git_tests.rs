//! Store over a real git working copy
//!
//! Skipped when no git binary is on the PATH.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use gitdb::{CommitState, Config, GitBinary, PushTarget, Registry, Store, User};
use tempfile::TempDir;

use crate::common::*;

fn git_available() -> bool {
    let available = GitBinary::new().is_available();
    if !available {
        eprintln!("git not found, skipping");
    }
    available
}

fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8(output.stdout).unwrap()
}

fn git_config(temp: &TempDir) -> Config {
    Config::builder()
        .db_path(temp.path().join("db"))
        .driver(Arc::new(GitBinary::new()))
        .user(User::new("Tester", "tester@gitdb.io"))
        .registry(Registry::new().register::<Message>("Message"))
        .build()
}

#[test]
fn test_insert_leaves_clean_tree() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let store = Store::open(git_config(&temp)).unwrap();

    let id = store.insert(&mut message(1, "alice@example.com", "Hello")).unwrap();
    assert_eq!(store.last_commit_state(), CommitState::Committed);

    let repo = store.data_dir();
    assert!(git(repo, &["status", "--porcelain"]).trim().is_empty());

    let log = git(repo, &["log", "-1", "--format=%an <%ae>|%s"]);
    assert_eq!(log.trim(), format!("Tester <tester@gitdb.io>|Inserted {}", id));

    // the marker is local state and never committed
    let tracked = git(repo, &["ls-files"]);
    assert!(tracked.contains("Message/b0.json"));
    assert!(tracked.contains(".gitdb/index/Message/From.json"));
    assert!(!tracked.contains("index.built"));
}

#[test]
fn test_reopen_discards_uncommitted_edits() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let store = Store::open(git_config(&temp)).unwrap();
    let id = store.insert(&mut message(1, "alice@example.com", "Hello")).unwrap();
    let path = store.block_path("Message", "b0");
    drop(store);

    std::fs::write(&path, "{}").unwrap();

    let store = Store::open(git_config(&temp)).unwrap();
    let loaded: Message = store.get(&id).unwrap();
    assert_eq!(loaded.body, "Hello");
}

#[test]
fn test_push_to_bare_offline_remote() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("remote.git");
    git(temp.path(), &["init", "--bare", remote.to_str().unwrap()]);

    let config = Config::builder()
        .db_path(temp.path().join("db"))
        .driver(Arc::new(GitBinary::new()))
        .offline_remote(remote.to_str().unwrap())
        .push_target(PushTarget::Offline)
        .user(User::new("Tester", "tester@gitdb.io"))
        .build();
    let store = Store::open(config).unwrap();

    let id = store.insert(&mut message(1, "alice@example.com", "Hello")).unwrap();
    assert_eq!(store.last_commit_state(), CommitState::Pushed);

    let log = git(&remote, &["log", "-1", "--format=%s", "master"]);
    assert_eq!(log.trim(), format!("Inserted {}", id));
}
