//! Reserved Table
//!
//! LMDB's unnamed database. LMDB keeps the names of all named databases here
//! and Yuna keeps its metadata record here, so this table is deliberately
//! opinionated: string keys, JSON values, and no way to overwrite the
//! metadata key. Anything more elaborate belongs in a real table.

use heed::Env;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{check_finite, encode_raw_key};
use crate::error::{Result, YunaError};
use crate::meta::{ReservedDb, META_KEY};

/// Handle on the reserved table, borrowed from an open database
pub struct Reserved<'a> {
    env: &'a Env,
    db: ReservedDb,
}

impl<'a> Reserved<'a> {
    pub(crate) fn new(env: &'a Env, db: ReservedDb) -> Self {
        Self { env, db }
    }

    /// Get a JSON value, or `None` if absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.raw_get(key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| YunaError::Deserialization {
                    table: RESERVED.to_string(),
                    key: key.to_string(),
                    source: e.into(),
                }),
            None => Ok(None),
        }
    }

    /// Get a JSON value, or `default` if absent
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Store a JSON value
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = check_finite(value)
            .and_then(|()| serde_json::to_vec(value))
            .map_err(|e| YunaError::Serialization {
                table: RESERVED.to_string(),
                key: key.to_string(),
                source: e.into(),
            })?;
        self.raw_put(key.as_bytes(), &bytes)
    }

    /// Remove a key. Removing an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.raw_delete(key.as_bytes())?;
        Ok(())
    }

    /// Keys in key order, skipping any that are not UTF-8
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .raw_keys()?
            .into_iter()
            .filter_map(|k| String::from_utf8(k).ok())
            .collect())
    }

    pub fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = encode_raw_key(key)?;
        let rtxn = self.env.read_txn()?;
        Ok(self.db.get(&rtxn, key)?.map(|bytes| bytes.to_vec()))
    }

    pub fn raw_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = writable_key(key)?;
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        Ok(())
    }

    pub fn raw_delete(&self, key: &[u8]) -> Result<bool> {
        let key = writable_key(key)?;
        let mut wtxn = self.env.write_txn()?;
        let deleted = self.db.delete(&mut wtxn, key)?;
        if deleted {
            wtxn.commit()?;
        }
        Ok(deleted)
    }

    pub fn raw_keys(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.raw_items()?.into_iter().map(|(k, _)| k).collect())
    }

    /// Raw `(key, bytes)` pairs, excluding the metadata record
    pub fn raw_items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let rtxn = self.env.read_txn()?;
        let mut items = Vec::new();
        for entry in self.db.iter(&rtxn)? {
            let (key, value) = entry?;
            if key != META_KEY.as_bytes() {
                items.push((key.to_vec(), value.to_vec()));
            }
        }
        Ok(items)
    }
}

/// Name used for the reserved table in error messages
const RESERVED: &str = "<reserved>";

fn writable_key(key: &[u8]) -> Result<&[u8]> {
    let key = encode_raw_key(key)?;
    if key == META_KEY.as_bytes() {
        return Err(YunaError::InvalidKey(format!(
            "'{}' is managed by Yuna and cannot be written directly",
            META_KEY
        )));
    }
    Ok(key)
}

impl std::fmt::Debug for Reserved<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reserved")
            .field("path", &self.env.path())
            .finish()
    }
}
