//! Record payload encoding
//!
//! Current records carry their index values next to the model data so
//! indexes can be rebuilt without knowing the model type. Legacy records are
//! the bare model and need the registry to recover index values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GitDbError, Result};

use super::PayloadCipher;

/// Payload format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadVersion {
    /// Bare model object (read-only compatibility)
    #[serde(rename = "v1")]
    V1,

    #[serde(rename = "v2")]
    V2,
}

/// Current on-disk envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub version: PayloadVersion,
    pub indexes: BTreeMap<String, Value>,
    pub data: Value,
}

/// A block file entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordPayload {
    Current(Envelope),
    Legacy(Value),
}

impl RecordPayload {
    /// Encode model data, sealing it when a key is configured
    pub fn seal(
        indexes: BTreeMap<String, Value>,
        data: Value,
        key: Option<&str>,
        cipher: &dyn PayloadCipher,
    ) -> Result<Self> {
        let data = match key {
            Some(key) => {
                let plain = serde_json::to_string(&data)
                    .map_err(|e| GitDbError::Parse(format!("encode model: {}", e)))?;
                Value::String(cipher.seal(key, &plain)?)
            }
            None => data,
        };

        Ok(RecordPayload::Current(Envelope {
            version: PayloadVersion::V2,
            indexes,
            data,
        }))
    }

    pub fn version(&self) -> PayloadVersion {
        match self {
            RecordPayload::Current(envelope) => envelope.version,
            RecordPayload::Legacy(_) => PayloadVersion::V1,
        }
    }

    /// Stored index values (legacy records have none)
    pub fn indexes(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            RecordPayload::Current(envelope) => Some(&envelope.indexes),
            RecordPayload::Legacy(_) => None,
        }
    }

    /// Decode the model's JSON form
    ///
    /// String data is either sealed (key configured) or a JSON document
    /// encoded as a string, as older writers produced.
    pub fn open(&self, key: Option<&str>, cipher: &dyn PayloadCipher) -> Result<Value> {
        let data = match self {
            RecordPayload::Current(envelope) => &envelope.data,
            RecordPayload::Legacy(value) => value,
        };

        match data {
            Value::String(text) => {
                let plain = match key {
                    Some(key) => cipher.open(key, text)?,
                    None => text.clone(),
                };
                serde_json::from_str(&plain)
                    .map_err(|e| GitDbError::Parse(format!("decode model: {}", e)))
            }
            Value::Object(_) => Ok(data.clone()),
            other => Err(GitDbError::Parse(format!(
                "unexpected record data: {}",
                other
            ))),
        }
    }
}
