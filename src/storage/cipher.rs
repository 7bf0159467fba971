//! Encryption insertion point
//!
//! Payload data passes through a cipher on its way to and from disk whenever
//! an encryption key is configured. Index values are never sealed.

use std::fmt;

use crate::error::Result;

/// Seals and opens serialized model data
pub trait PayloadCipher: Send + Sync + fmt::Debug {
    fn seal(&self, key: &str, plaintext: &str) -> Result<String>;

    fn open(&self, key: &str, sealed: &str) -> Result<String>;
}

/// Identity cipher
#[derive(Debug, Default, Clone, Copy)]
pub struct Plaintext;

impl PayloadCipher for Plaintext {
    fn seal(&self, _key: &str, plaintext: &str) -> Result<String> {
        Ok(plaintext.to_string())
    }

    fn open(&self, _key: &str, sealed: &str) -> Result<String> {
        Ok(sealed.to_string())
    }
}
