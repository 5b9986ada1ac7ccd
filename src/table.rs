//! Table Module
//!
//! One named LMDB database bound to a fixed codec pipeline, with dict-like
//! access.
//!
//! ## Transactions
//! Every operation runs in exactly one LMDB transaction. Values are encoded
//! before a write transaction begins and decoded after a read transaction
//! ends, so a codec failure can never leave partial bytes behind or disturb
//! what is already stored.
//!
//! ## Strict vs lenient
//! | lenient            | strict                     |
//! |--------------------|----------------------------|
//! | `get` / `get_or`   | `get_strict` → KeyNotFound |
//! | `delete`           | `delete_strict` → KeyNotFound |

use heed::types::Bytes;
use heed::{Database, Env};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::{check_finite, encode_raw_key, Pipeline};
use crate::error::{Result, YunaError};
use crate::meta::TableDescriptor;

/// A table inside an open Yuna database
///
/// Tables are owned by their [`Database`](crate::Database) and borrowed from
/// it; the codec pipeline is resolved once, when the table is opened.
#[derive(Clone)]
pub struct Table {
    /// Environment the table lives in (shared handle)
    env: Env,
    /// The named LMDB database
    db: Database<Bytes, Bytes>,
    /// Name and formats, as persisted in the metadata record
    descriptor: TableDescriptor,
    /// Resolved value codecs
    pipeline: Pipeline,
}

impl Table {
    pub(crate) fn new(
        env: Env,
        db: Database<Bytes, Bytes>,
        descriptor: TableDescriptor,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            env,
            db,
            descriptor,
            pipeline,
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Persisted description of this table
    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value, or `None` if the key is absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let bytes = self.raw_get(self.encode_key(key)?)?;
        bytes.map(|bytes| self.decode_value(key, &bytes)).transpose()
    }

    /// Get a value, or `default` if the key is absent
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Get a value; an absent key is an error
    pub fn get_strict<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)?
            .ok_or_else(|| YunaError::key_not_found(self.name(), key))
    }

    /// Whether the key is present. The stored value is not decoded.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let key = self.encode_key(key)?;
        let rtxn = self.env.read_txn()?;
        Ok(self.db.get(&rtxn, key)?.is_some())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a value, replacing any previous value for the key
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.encode_value(key, value)?;
        self.raw_put(self.encode_key(key)?, &bytes)
    }

    /// Remove a key. Removing an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.raw_delete(self.encode_key(key)?)?;
        Ok(())
    }

    /// Remove a key that must exist
    pub fn delete_strict(&self, key: &str) -> Result<()> {
        if self.raw_delete(self.encode_key(key)?)? {
            Ok(())
        } else {
            Err(YunaError::key_not_found(self.name(), key))
        }
    }

    /// Remove every entry, keeping the table itself
    pub fn truncate(&self) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.db.clear(&mut wtxn)?;
        wtxn.commit()?;
        tracing::debug!(table = %self.name(), "table truncated");
        Ok(())
    }

    // =========================================================================
    // Iteration (whole table, key order)
    // =========================================================================

    /// All keys in key order
    pub fn keys(&self) -> Result<Vec<String>> {
        self.raw_keys()?
            .iter()
            .map(|k| self.descriptor.key_format.decode(k))
            .collect()
    }

    /// All values in key order
    pub fn values<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        Ok(self.items()?.into_iter().map(|(_, v)| v).collect())
    }

    /// All `(key, value)` pairs in key order
    pub fn items<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>> {
        self.raw_items()?
            .into_iter()
            .map(|(k, v)| {
                let key = self.descriptor.key_format.decode(&k)?;
                let value = self.decode_value(&key, &v)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.len(&rtxn)?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // =========================================================================
    // Raw Access (no value codecs)
    // =========================================================================

    /// Stored bytes for a key, exactly as written
    pub fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = encode_raw_key(key)?;
        let rtxn = self.env.read_txn()?;
        Ok(self.db.get(&rtxn, key)?.map(|bytes| bytes.to_vec()))
    }

    /// Store bytes under a key, bypassing the value codecs
    pub fn raw_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = encode_raw_key(key)?;
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Remove a key; returns whether it was present
    pub fn raw_delete(&self, key: &[u8]) -> Result<bool> {
        let key = encode_raw_key(key)?;
        let mut wtxn = self.env.write_txn()?;
        let deleted = self.db.delete(&mut wtxn, key)?;
        if deleted {
            wtxn.commit()?;
        }
        Ok(deleted)
    }

    /// All stored keys in key order
    pub fn raw_keys(&self) -> Result<Vec<Vec<u8>>> {
        let rtxn = self.env.read_txn()?;
        let mut keys = Vec::new();
        for entry in self.db.iter(&rtxn)? {
            let (key, _) = entry?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// All stored `(key, bytes)` pairs in key order
    pub fn raw_items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let rtxn = self.env.read_txn()?;
        let mut items = Vec::new();
        for entry in self.db.iter(&rtxn)? {
            let (key, value) = entry?;
            items.push((key.to_vec(), value.to_vec()));
        }
        Ok(items)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn encode_key<'k>(&self, key: &'k str) -> Result<&'k [u8]> {
        self.descriptor.key_format.encode(key)
    }

    fn encode_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<Vec<u8>> {
        check_finite(value)
            .and_then(|()| serde_json::to_value(value))
            .map_err(Into::into)
            .and_then(|value| self.pipeline.encode(&value))
            .map_err(|source| YunaError::Serialization {
                table: self.name().to_string(),
                key: key.to_string(),
                source,
            })
    }

    fn decode_value<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T> {
        self.pipeline
            .decode(bytes)
            .and_then(|value: Value| serde_json::from_value(value).map_err(Into::into))
            .map_err(|source| YunaError::Deserialization {
                table: self.name().to_string(),
                key: key.to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
