//! Index cache
//!
//! In-memory copy of index files keyed by file path. Not synchronized: the
//! store keeps it behind a mutex and only mutates it on the write path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GitDbError, Result};
use crate::model::Registry;

/// One index: record address → field value
pub type Index = BTreeMap<String, Value>;

const INDEX_EXTENSION: &str = "json";

pub struct IndexCache {
    /// Directory holding one sub-directory per dataset
    root: PathBuf,

    /// Loaded indexes by file path
    indexes: HashMap<PathBuf, Index>,

    /// Files changed since the last flush
    dirty: BTreeSet<PathBuf>,
}

impl IndexCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexes: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{dataset}`
    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset)
    }

    /// `{root}/{dataset}/{field}.json`
    pub fn index_file(&self, dataset: &str, field: &str) -> PathBuf {
        self.dataset_dir(dataset)
            .join(format!("{}.{}", field, INDEX_EXTENSION))
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Record precomputed index values for each `(address, values)` pair
    pub fn update_indexes<'a, I>(&mut self, dataset: &str, records: I)
    where
        I: IntoIterator<Item = (&'a str, &'a BTreeMap<String, Value>)>,
    {
        for (id, values) in records {
            for (name, value) in values {
                let file = self.index_file(dataset, name);
                self.load(&file).insert(id.to_string(), value.clone());
                self.dirty.insert(file);
            }
        }
    }

    /// Legacy path: hydrate each record through the registry and read index
    /// values off the live model
    pub fn update_indexes_v1<I>(&mut self, dataset: &str, records: I, registry: &Registry) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (id, data) in records {
            let model = registry.hydrate(dataset, data)?;
            let schema = model.schema();
            self.update_indexes(dataset, [(id.as_str(), schema.indexes())]);
        }
        Ok(())
    }

    /// Drop `id` from every index of `dataset`; returns how many indexes
    /// held it
    pub fn remove_record(&mut self, dataset: &str, id: &str) -> Result<usize> {
        let mut removed = 0;
        for file in self.known_files(dataset)? {
            if self.load(&file).remove(id).is_some() {
                self.dirty.insert(file);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Empty every index of `dataset` ahead of a rebuild
    pub fn reset_dataset(&mut self, dataset: &str) -> Result<()> {
        for file in self.known_files(dataset)? {
            self.indexes.insert(file.clone(), Index::new());
            self.dirty.insert(file);
        }
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn index(&mut self, dataset: &str, field: &str) -> &Index {
        let file = self.index_file(dataset, field);
        self.load(&file)
    }

    /// Addresses whose indexed values match every criterion, in address order
    ///
    /// A criterion on a field without an index matches nothing.
    pub fn find(&mut self, dataset: &str, criteria: &BTreeMap<String, Value>) -> Vec<String> {
        let mut matches: Option<BTreeSet<String>> = None;

        for (field, wanted) in criteria {
            let hits: BTreeSet<String> = self
                .index(dataset, field)
                .iter()
                .filter(|(_, value)| *value == wanted)
                .map(|(id, _)| id.clone())
                .collect();

            let narrowed = match matches {
                Some(current) => current.intersection(&hits).cloned().collect(),
                None => hits,
            };
            if narrowed.is_empty() {
                return Vec::new();
            }
            matches = Some(narrowed);
        }

        matches.map(|m| m.into_iter().collect()).unwrap_or_default()
    }

    /// Whether `dataset` has any index file on disk or in memory
    pub fn has_indexes(&self, dataset: &str) -> Result<bool> {
        Ok(!self.known_files(dataset)?.is_empty())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write every changed index (tab-indented JSON)
    ///
    /// The dirty set is cleared only once all files are written.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }

        debug!(files = self.dirty.len(), "flushing index");
        for file in &self.dirty {
            let index = match self.indexes.get(file) {
                Some(index) => index,
                None => continue,
            };

            if let Some(dir) = file.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(file, encode_index(index, file)?)?;
        }

        self.dirty.clear();
        Ok(())
    }

    /// Read one index file
    ///
    /// Missing or corrupt files yield an empty index; corruption is logged.
    pub fn read_index(file: &Path) -> Index {
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Index::new(),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to read index");
                return Index::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(index) => index,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "corrupt index, starting empty");
                Index::new()
            }
        }
    }

    /// Forget everything loaded (pending changes included)
    pub fn clear(&mut self) {
        self.indexes.clear();
        self.dirty.clear();
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn load(&mut self, file: &Path) -> &mut Index {
        self.indexes
            .entry(file.to_path_buf())
            .or_insert_with(|| Self::read_index(file))
    }

    /// Index files of a dataset: those on disk plus those only in memory
    fn known_files(&self, dataset: &str) -> Result<BTreeSet<PathBuf>> {
        let dir = self.dataset_dir(dataset);
        let mut files: BTreeSet<PathBuf> = self
            .indexes
            .keys()
            .filter(|file| file.parent() == Some(dir.as_path()))
            .cloned()
            .collect();

        match fs::read_dir(&dir) {
            Ok(read_dir) => {
                for entry in read_dir {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) == Some(INDEX_EXTENSION) {
                        files.insert(path);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(files)
    }
}

fn encode_index(index: &Index, file: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    index
        .serialize(&mut serializer)
        .map_err(|e| GitDbError::parse_at(file, e))?;
    Ok(buf)
}
