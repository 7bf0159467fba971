//! Model Module
//!
//! Client types describe how they are stored through a [`Schema`]: which
//! dataset they belong to, which block receives them, the record id, and the
//! values to index.
//!
//! ## Example
//! ```ignore
//! impl Model for Message {
//!     fn schema(&self) -> Schema {
//!         Schema::new("Message", AutoBlock::new(200_000_000, 100), record_id_from_time(self.base.created_at()))
//!             .index("From", self.from.as_str())
//!     }
//!     fn base(&self) -> &BaseModel { &self.base }
//!     fn base_mut(&mut self) -> &mut BaseModel { &mut self.base }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::SEPARATOR;
use crate::error::{GitDbError, Result};

// =============================================================================
// Model
// =============================================================================

/// A storable document type
pub trait Model: Serialize + DeserializeOwned + Send + 'static {
    /// Addressing and index description for this instance
    fn schema(&self) -> Schema;

    fn base(&self) -> &BaseModel;

    fn base_mut(&mut self) -> &mut BaseModel;
}

/// Object-safe view of a model, used when the concrete type is only known
/// through the [`Registry`]
pub trait Indexed: Send {
    fn schema(&self) -> Schema;
}

impl<M: Model> Indexed for M {
    fn schema(&self) -> Schema {
        Model::schema(self)
    }
}

/// Fields every model carries
///
/// Embed with `#[serde(flatten)]`. The id is assigned by the store and is not
/// part of the serialized payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseModel {
    #[serde(skip)]
    id: String,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl BaseModel {
    /// Full record address, empty until inserted or loaded
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = at;
    }

    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Fill unset timestamps before the schema is derived
    pub(crate) fn stamp(&mut self, now: DateTime<Utc>) {
        let unset = DateTime::<Utc>::default();
        if self.created_at == unset {
            self.created_at = now;
        }
        if self.updated_at == unset {
            self.updated_at = self.created_at;
        }
    }
}

/// Record id derived from a timestamp: `YYYYMMDDhhmmss[.fraction]`
///
/// Trailing zeros of the nanosecond fraction are dropped, and so is the dot
/// when the fraction is zero.
pub fn record_id_from_time(at: DateTime<Utc>) -> String {
    let mut id = at.format("%Y%m%d%H%M%S").to_string();
    let nanos = at.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        id.push('.');
        id.push_str(fraction.trim_end_matches('0'));
    }
    id
}

// =============================================================================
// Schema
// =============================================================================

/// How a record's block is chosen
#[derive(Debug, Clone, PartialEq)]
pub enum BlockSpec {
    /// Fixed block name computed by the model (e.g. `"201902"`)
    Named(String),

    /// Size/count driven rollover
    Auto(AutoBlock),
}

/// Thresholds for automatic block rollover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoBlock {
    /// Max block file size in bytes
    pub max_bytes: u64,

    /// Max records per block
    pub max_records: usize,
}

impl AutoBlock {
    pub fn new(max_bytes: u64, max_records: usize) -> Self {
        Self {
            max_bytes,
            max_records,
        }
    }
}

impl From<AutoBlock> for BlockSpec {
    fn from(auto: AutoBlock) -> Self {
        BlockSpec::Auto(auto)
    }
}

impl From<String> for BlockSpec {
    fn from(name: String) -> Self {
        BlockSpec::Named(name)
    }
}

impl From<&str> for BlockSpec {
    fn from(name: &str) -> Self {
        BlockSpec::Named(name.to_string())
    }
}

/// Storage description of one model instance
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    dataset: String,
    block: BlockSpec,
    record_id: String,
    indexes: BTreeMap<String, Value>,
}

impl Schema {
    pub fn new(
        dataset: impl Into<String>,
        block: impl Into<BlockSpec>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            block: block.into(),
            record_id: record_id.into(),
            indexes: BTreeMap::new(),
        }
    }

    /// Add a named index value
    pub fn index(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.indexes.insert(name.into(), value.into());
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn block(&self) -> &BlockSpec {
        &self.block
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn indexes(&self) -> &BTreeMap<String, Value> {
        &self.indexes
    }

    /// Check that the schema can produce a valid address and index file names
    pub fn validate(&self) -> Result<()> {
        let block_name = match &self.block {
            BlockSpec::Named(name) => Some(name.as_str()),
            BlockSpec::Auto(_) => None,
        };

        let segments = [Some(self.dataset.as_str()), block_name, Some(self.record_id.as_str())];
        for segment in segments.into_iter().flatten() {
            if segment.is_empty() || segment.contains(SEPARATOR) {
                return Err(GitDbError::Schema(format!(
                    "dataset {:?}: invalid address segment {:?}",
                    self.dataset, segment
                )));
            }
        }

        if self.dataset.starts_with('.') {
            return Err(GitDbError::Schema(format!(
                "dataset name {:?} is reserved",
                self.dataset
            )));
        }

        for name in self.indexes.keys() {
            if name.is_empty() || name.contains(SEPARATOR) || name.contains('\\') {
                return Err(GitDbError::Schema(format!(
                    "dataset {:?}: invalid index name {:?}",
                    self.dataset, name
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Registry (dataset name → constructor)
// =============================================================================

type Constructor = Arc<dyn Fn(Value) -> Result<Box<dyn Indexed>> + Send + Sync>;

/// Maps dataset names to model constructors
///
/// Used to hydrate legacy records whose index values must be read off a live
/// model instance.
#[derive(Clone, Default)]
pub struct Registry {
    constructors: HashMap<String, Constructor>,
    fallback: Option<Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M` as the model for `dataset`
    pub fn register<M: Model>(mut self, dataset: impl Into<String>) -> Self {
        self.constructors.insert(dataset.into(), Self::constructor::<M>());
        self
    }

    /// Use `M` for every dataset without an explicit registration
    pub fn fallback<M: Model>(mut self) -> Self {
        self.fallback = Some(Self::constructor::<M>());
        self
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.constructors.contains_key(dataset) || self.fallback.is_some()
    }

    /// Build a model for `dataset` from its JSON form
    pub fn hydrate(&self, dataset: &str, value: Value) -> Result<Box<dyn Indexed>> {
        let constructor = self
            .constructors
            .get(dataset)
            .or(self.fallback.as_ref())
            .ok_or_else(|| GitDbError::UnregisteredDataset(dataset.to_string()))?;
        constructor(value)
    }

    fn constructor<M: Model>() -> Constructor {
        Arc::new(|value: Value| {
            let model: M = serde_json::from_value(value)
                .map_err(|e| GitDbError::Parse(format!("hydrate model: {}", e)))?;
            Ok(Box::new(model) as Box<dyn Indexed>)
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut datasets: Vec<&String> = self.constructors.keys().collect();
        datasets.sort();
        f.debug_struct("Registry")
            .field("datasets", &datasets)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
