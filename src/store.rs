//! Store Module
//!
//! The document store that coordinates block files, indexes and version
//! control.
//!
//! ## Responsibilities
//! - Address, encode and persist records (insert/get/fetch/delete)
//! - Keep indexes current on the write path, rebuild them on demand
//! - Commit every mutation and push it per the configured policy
//! - Pull before reads when a sync is due

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::address::{Address, SEPARATOR};
use crate::config::Config;
use crate::error::{GitDbError, Result};
use crate::index::IndexCache;
use crate::model::{BlockSpec, Model, Schema};
use crate::query::{self, ScannedRecord};
use crate::storage::{list_blocks, list_datasets, BlockAllocator, BlockFile, RecordPayload};
use crate::vcs::{CommitState, SyncCoordinator, SyncHealth};

/// The document store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (insert/delete/index rebuild/sync): Serialized by `write_lock`
///   - Only ONE mutation of the working tree at a time
///   - Lock order: write_lock → tree → index
///
/// - **Reads** (get/fetch): Shared `tree` lock, no write_lock
///   - Block files written by the store are replaced by rename, so a reader
///     sees either the old or the new file, never a partial one
///   - Pulls and checkouts rewrite files in place; they hold `tree`
///     exclusively so no scan observes a half-merged block
///   - A read takes the write lock only to pull when a sync is due
pub struct Store {
    /// Store configuration
    config: Config,

    /// Git working copy holding dataset directories
    data_dir: PathBuf,

    /// Index cache (guarded; only mutated on the write path)
    index: Mutex<IndexCache>,

    /// Commit/pull/push sequencing
    sync: SyncCoordinator,

    /// Newest remote change the indexes are known to cover
    ///
    /// Set by full rebuilds and advanced by our own pushes to the online
    /// remote, so only foreign commits trigger a rebuild after a pull.
    indexed_through: Mutex<Option<DateTime<Utc>>>,

    /// Serializes mutations of the working tree
    write_lock: Mutex<()>,

    /// Shared by reads, exclusive for pulls and checkouts
    tree: RwLock<()>,
}

impl Store {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const INTERNAL_DIR: &'static str = ".gitdb";
    const INDEX_DIR: &'static str = "index";
    const INDEX_MARKER: &'static str = "index.built";
    const ID_FILE: &'static str = ".id";

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create the repository if needed (remotes, initial pull, .gitignore)
    /// 2. Discard uncommitted changes left in the working copy
    /// 3. Rebuild indexes if this working copy has never built them
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Repository
        let data_dir = config.data_dir();
        fs::create_dir_all(&data_dir)?;

        let sync = SyncCoordinator::new(&config, &data_dir);
        let marker = Self::internal_path(Self::INDEX_MARKER);
        sync.init(&[marker.as_str(), Self::ID_FILE])?;

        // Step 2: Clean tree
        if let Err(e) = sync.checkout() {
            warn!(error = %e, "failed to discard uncommitted changes");
        }

        // Step 3: Indexes
        let index_dir = data_dir.join(Self::INTERNAL_DIR).join(Self::INDEX_DIR);
        let marker_path = data_dir.join(&marker);
        let indexed_at = Self::read_marker(&marker_path);

        let store = Self {
            config,
            data_dir,
            index: Mutex::new(IndexCache::new(index_dir)),
            sync,
            indexed_through: Mutex::new(indexed_at),
            write_lock: Mutex::new(()),
            tree: RwLock::new(()),
        };

        if indexed_at.is_none() {
            store.build_index()?;
        }

        info!(path = %store.data_dir.display(), "store opened");
        Ok(store)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified root directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.db_path = path.to_path_buf();
        Self::open(config)
    }

    /// Split an id into its address parts
    pub fn parse_id(&self, id: &str) -> Result<Address> {
        Address::parse(id)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or overwrite a record
    ///
    /// Unset timestamps are filled in, the block is chosen, the record is
    /// written, indexes are updated, and the change is committed and pushed.
    /// The model's id is set to the record address, which is also returned.
    /// A failed push does not fail the insert; see [`Store::sync_health`].
    pub fn insert<M: Model>(&self, model: &mut M) -> Result<String> {
        let _write_guard = self.write_lock.lock();

        model.base_mut().stamp(Utc::now());
        let schema = model.schema();
        schema.validate()?;

        let block = self.resolve_block(&schema, model.base().id())?;
        let address = Address::new(schema.dataset(), block, schema.record_id())
            .map_err(|e| GitDbError::Schema(e.to_string()))?;
        let id = address.to_string();

        let data = serde_json::to_value(&*model)
            .map_err(|e| GitDbError::Parse(format!("encode {}: {}", id, e)))?;
        let payload = RecordPayload::seal(
            schema.indexes().clone(),
            data,
            self.encryption_key(),
            self.config.cipher.as_ref(),
        )?;

        let mut file = BlockFile::open_or_empty(&self.block_path(address.dataset(), address.block()))?;
        file.insert(address.record_id(), payload);
        file.save()?;

        model.base_mut().set_id(id.clone());

        {
            let mut index = self.index.lock();
            index.update_indexes(schema.dataset(), [(id.as_str(), schema.indexes())]);
            index.flush()?;
        }

        let state = self.sync.commit_and_push(&format!("Inserted {}", id));
        self.note_pushed(state);
        debug!(id = %id, ?state, "inserted");
        Ok(id)
    }

    /// Delete a record; `Ok(false)` if it was not there
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.delete_record(id, false)
    }

    /// Delete a record; `Err(NotFound)` if it was not there
    pub fn delete_or_fail(&self, id: &str) -> Result<bool> {
        self.delete_record(id, true)
    }

    fn delete_record(&self, id: &str, must_exist: bool) -> Result<bool> {
        let address = Address::parse(id)?;
        let path = self.resolve(&address)?;
        let _write_guard = self.write_lock.lock();

        let absent = || {
            if must_exist {
                Err(GitDbError::NotFound(id.to_string()))
            } else {
                Ok(false)
            }
        };

        let mut file = match BlockFile::open(&path)? {
            Some(file) => file,
            None => return absent(),
        };
        if file.remove(address.record_id()).is_none() {
            return absent();
        }
        file.save()?;

        {
            let mut index = self.index.lock();
            index.remove_record(address.dataset(), id)?;
            index.flush()?;
        }

        let state = self.sync.commit_and_push(&format!("Deleted {}", id));
        self.note_pushed(state);
        debug!(id, ?state, "deleted");
        Ok(true)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load one record
    ///
    /// `id` is either a full `Dataset/Block/RecordId` address or a bare
    /// record id, which is looked up in `M`'s dataset.
    pub fn get<M: Model + Default>(&self, id: &str) -> Result<M> {
        self.refresh();
        let _tree_guard = self.tree.read();

        let address = if id.contains(SEPARATOR) {
            Address::parse(id)?
        } else {
            let dataset = M::default().schema().dataset().to_string();
            self.locate(&dataset, id)?
        };

        let data = self.read_record(&address)?;
        Self::hydrate(address.to_string(), data)
    }

    /// Load one record as JSON (full address required)
    pub fn get_raw(&self, id: &str) -> Result<Value> {
        self.refresh();
        let _tree_guard = self.tree.read();
        self.read_record(&Address::parse(id)?)
    }

    /// All records of a dataset, in block order
    pub fn fetch<M: Model>(&self, dataset: &str) -> Result<Vec<M>> {
        Self::check_dataset(dataset)?;
        self.refresh();
        let _tree_guard = self.tree.read();
        let records = query::scan(&self.dataset_dir(dataset), dataset)?;
        self.hydrate_all(records)
    }

    /// All records of a dataset, decoded by a pool of scan workers
    ///
    /// Same records as [`Store::fetch`], in no particular order.
    pub fn fetch_parallel<M: Model>(&self, dataset: &str) -> Result<Vec<M>> {
        Self::check_dataset(dataset)?;
        self.refresh();
        let _tree_guard = self.tree.read();
        let records = query::scan_parallel(&self.dataset_dir(dataset), dataset, self.config.scan_workers)?;
        self.hydrate_all(records)
    }

    /// All records of a dataset as `(address, JSON)` pairs
    pub fn fetch_raw(&self, dataset: &str) -> Result<Vec<(String, Value)>> {
        Self::check_dataset(dataset)?;
        self.refresh();
        let _tree_guard = self.tree.read();
        query::scan(&self.dataset_dir(dataset), dataset)?
            .into_iter()
            .map(|record| {
                let data = self.open_payload(&record.payload)?;
                Ok((record.id, data))
            })
            .collect()
    }

    /// First record (in address order) whose indexed fields equal every
    /// criterion
    ///
    /// Only indexed fields can be matched. The dataset's indexes are rebuilt
    /// first if none exist.
    pub fn get_model<M: Model + Default>(&self, criteria: &BTreeMap<String, Value>) -> Result<M> {
        self.refresh();
        let schema = M::default().schema();
        let dataset = schema.dataset().to_string();
        let no_match = || GitDbError::NotFound(format!("{} matching {:?}", dataset, criteria));

        if schema.indexes().is_empty() {
            return Err(no_match());
        }

        let has_indexes = self.index.lock().has_indexes(&dataset)?;
        if !has_indexes {
            let _write_guard = self.write_lock.lock();
            self.build_dataset_index_locked(&dataset)?;

            let built = {
                let mut index = self.index.lock();
                index.flush()?;
                index.has_indexes(&dataset)?
            };
            if !built {
                // no records carry index values yet
                return Err(no_match());
            }
            self.sync.commit(&format!("Rebuilt index for {}", dataset));
        }

        let candidates = self.index.lock().find(&dataset, criteria);
        for id in candidates {
            match self.get::<M>(&id) {
                Ok(model) => return Ok(model),
                Err(e) if e.is_not_found() => {
                    debug!(id = %id, "stale index entry");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(no_match())
    }

    /// Dataset names present on disk
    pub fn datasets(&self) -> Result<Vec<String>> {
        list_datasets(&self.data_dir)
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Rebuild every dataset's indexes from its block files and commit them
    pub fn build_index(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.build_index_locked()?;
        self.sync.commit("Rebuilt indexes");
        Ok(())
    }

    /// Write pending index changes
    pub fn flush_index(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.index.lock().flush()
    }

    fn build_index_locked(&self) -> Result<()> {
        info!("building index");
        for dataset in list_datasets(&self.data_dir)? {
            if let Err(e) = self.build_dataset_index_locked(&dataset) {
                warn!(dataset = %dataset, error = %e, "skipping dataset in index build");
            }
        }
        self.index.lock().flush()?;

        let now = Utc::now();
        let marker = self.data_dir.join(Self::internal_path(Self::INDEX_MARKER));
        if let Some(dir) = marker.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&marker, now.to_rfc3339())?;
        *self.indexed_through.lock() = Some(now);

        info!("building index complete");
        Ok(())
    }

    /// Replace one dataset's indexes with values read from its records
    ///
    /// Current records supply their stored index values; legacy records are
    /// hydrated through the registry.
    fn build_dataset_index_locked(&self, dataset: &str) -> Result<()> {
        debug!(dataset, "building index for dataset");
        let records = query::scan(&self.dataset_dir(dataset), dataset)?;

        let mut index = self.index.lock();
        index.reset_dataset(dataset)?;

        let mut legacy = Vec::new();
        for record in &records {
            match record.payload.indexes() {
                Some(values) => index.update_indexes(dataset, [(record.id.as_str(), values)]),
                None => legacy.push((record.id.clone(), self.open_payload(&record.payload)?)),
            }
        }

        if !legacy.is_empty() {
            index.update_indexes_v1(dataset, legacy, &self.config.registry)?;
        }
        Ok(())
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Pull, rebuild indexes if the remote moved past them, then push
    ///
    /// Local state is left intact on failure; the first sync error is
    /// returned.
    pub fn sync(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        let pulled = {
            let _tree_guard = self.tree.write();
            let pulled = self.sync.pull();
            if pulled.is_ok() {
                self.reindex_if_stale_locked();
            }
            pulled
        };

        let pushed = self.sync.push();
        if pushed.is_ok() && self.sync.pushes_online() {
            self.advance_indexed_through(Utc::now());
        }

        pulled.and(pushed)
    }

    /// Call [`Store::sync`] every `sync_interval` on a background thread
    ///
    /// The loop ends when the handle is stopped or dropped, or when the
    /// store itself is dropped.
    pub fn start_sync_loop(self: &Arc<Self>) -> Result<SyncLoop> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let interval = self.config.sync_interval;
        let store: Weak<Self> = Arc::downgrade(self);

        let handle = thread::Builder::new()
            .name("gitdb-sync".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let store = match store.upgrade() {
                            Some(store) => store,
                            None => break,
                        };
                        if let Err(e) = store.sync() {
                            debug!(error = %e, "background sync incomplete");
                        }
                    }
                    _ => break,
                }
            })?;

        Ok(SyncLoop {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn sync_health(&self) -> SyncHealth {
        self.sync.health()
    }

    /// Commit state of the last mutating call
    pub fn last_commit_state(&self) -> CommitState {
        self.sync.health().last_state
    }

    /// Throw away uncommitted changes in the working copy
    pub fn discard_uncommitted(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let _tree_guard = self.tree.write();
        self.sync.checkout()?;
        self.index.lock().clear();
        Ok(())
    }

    /// Pull before a read if one is due; failures leave local state in use
    fn refresh(&self) {
        if !self.sync.pull_due() {
            return;
        }

        let _write_guard = self.write_lock.lock();
        if !self.sync.pull_due() {
            return;
        }

        let _tree_guard = self.tree.write();
        if self.sync.pull().is_ok() {
            self.reindex_if_stale_locked();
        }
    }

    fn reindex_if_stale_locked(&self) {
        let remote_at = match self.sync.last_commit_time() {
            Ok(at) => at,
            Err(e) => {
                debug!(error = %e, "no remote commit time");
                return;
            }
        };

        let indexed_through = *self.indexed_through.lock();
        if indexed_through.map_or(false, |at| remote_at <= at) {
            return;
        }

        // pulled records may not match cached index values
        self.index.lock().clear();
        match self.build_index_locked() {
            Ok(()) => {
                self.advance_indexed_through(remote_at);
                self.sync.commit("Rebuilt indexes");
            }
            Err(e) => warn!(error = %e, "index rebuild after pull failed"),
        }
    }

    /// After a push that reached the online remote, the remote holds nothing
    /// the indexes have not seen
    fn note_pushed(&self, state: CommitState) {
        if state == CommitState::Pushed && self.sync.pushes_online() {
            self.advance_indexed_through(Utc::now());
        }
    }

    fn advance_indexed_through(&self, at: DateTime<Utc>) {
        let mut through = self.indexed_through.lock();
        if through.map_or(true, |current| at > current) {
            *through = Some(at);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the working copy directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding a dataset's block files
    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.data_dir.join(dataset)
    }

    /// Path of a block file
    pub fn block_path(&self, dataset: &str, block: &str) -> PathBuf {
        BlockFile::path_for(&self.data_dir, dataset, block)
    }

    /// Path of an index file
    pub fn index_path(&self, dataset: &str, field: &str) -> PathBuf {
        self.index.lock().index_file(dataset, field)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Block file path for an address, refusing segments that would leave
    /// the dataset tree or reach internal directories
    fn resolve(&self, address: &Address) -> Result<PathBuf> {
        Self::check_dataset(address.dataset())?;
        if address.block().starts_with('.') {
            return Err(GitDbError::Format(format!("invalid block in {}", address)));
        }
        if matches!(address.record_id(), "." | "..") {
            return Err(GitDbError::Format(format!("invalid record id in {}", address)));
        }
        Ok(self.block_path(address.dataset(), address.block()))
    }

    fn check_dataset(dataset: &str) -> Result<()> {
        if dataset.is_empty() || dataset.starts_with('.') || dataset.contains(SEPARATOR) {
            return Err(GitDbError::Format(format!("invalid dataset {:?}", dataset)));
        }
        Ok(())
    }

    fn encryption_key(&self) -> Option<&str> {
        self.config.encryption_key.as_deref()
    }

    fn internal_path(name: &str) -> String {
        format!("{}/{}", Self::INTERNAL_DIR, name)
    }

    fn read_marker(path: &Path) -> Option<DateTime<Utc>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, "unreadable index marker");
                return None;
            }
        };
        DateTime::parse_from_rfc3339(text.trim())
            .map(|at| at.with_timezone(&Utc))
            .ok()
    }

    /// Block for an insert: named blocks are fixed; auto blocks keep an
    /// existing record where it is and otherwise ask the allocator
    fn resolve_block(&self, schema: &Schema, current_id: &str) -> Result<String> {
        match schema.block() {
            BlockSpec::Named(name) => Ok(name.clone()),
            BlockSpec::Auto(limits) => {
                if let Ok(current) = Address::parse(current_id) {
                    if current.dataset() == schema.dataset() && current.record_id() == schema.record_id() {
                        return Ok(current.block().to_string());
                    }
                }
                BlockAllocator::next_block(&self.dataset_dir(schema.dataset()), *limits)
            }
        }
    }

    /// Find the block holding a bare record id
    fn locate(&self, dataset: &str, record_id: &str) -> Result<Address> {
        Self::check_dataset(dataset)?;
        for (block, path) in list_blocks(&self.dataset_dir(dataset))? {
            if let Some(file) = BlockFile::open(&path)? {
                if file.get(record_id).is_some() {
                    return Address::new(dataset, block, record_id);
                }
            }
        }
        Err(GitDbError::NotFound(format!("{}/{}", dataset, record_id)))
    }

    fn read_record(&self, address: &Address) -> Result<Value> {
        let path = self.resolve(address)?;
        let file = BlockFile::open(&path)?
            .ok_or_else(|| GitDbError::NotFound(address.to_string()))?;
        let payload = file
            .get(address.record_id())
            .ok_or_else(|| GitDbError::NotFound(address.to_string()))?;
        self.open_payload(payload)
    }

    fn open_payload(&self, payload: &RecordPayload) -> Result<Value> {
        payload.open(self.encryption_key(), self.config.cipher.as_ref())
    }

    fn hydrate<M: Model>(id: String, data: Value) -> Result<M> {
        let mut model: M = serde_json::from_value(data)
            .map_err(|e| GitDbError::Parse(format!("decode {}: {}", id, e)))?;
        model.base_mut().set_id(id);
        Ok(model)
    }

    fn hydrate_all<M: Model>(&self, records: Vec<ScannedRecord>) -> Result<Vec<M>> {
        records
            .into_iter()
            .map(|record| {
                let data = self.open_payload(&record.payload)?;
                Self::hydrate(record.id, data)
            })
            .collect()
    }
}

/// Handle to the background sync thread
pub struct SyncLoop {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncLoop {
    /// Stop the loop and wait for an in-flight sync to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
