//! Metadata Record
//!
//! Identity and schema of a Yuna file, stored as JSON in LMDB's unnamed
//! database under [`META_KEY`].
//!
//! ## Layout
//! ```text
//! {
//!   "name": "inventory",          (optional)
//!   "version": 3,                 (optional)
//!   "yuna_version": 1,
//!   "tables": [
//!     {"name": "items", "key_serialize": "str", "serialize": "json",
//!      "compress": "lz4", "version": null},
//!     ...
//!   ]
//! }
//! ```
//!
//! The record is always read from and written to LMDB as a whole; callers
//! read, modify, and write back.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};

use crate::codec::{CompressFormat, KeyFormat, SerializeFormat};
use crate::error::{Result, YunaError};

/// Reserved key holding the metadata record
pub const META_KEY: &str = "__YUNA_DB_META__";

/// Layout version of the record written by this crate
pub const META_LAYOUT_VERSION: u32 = 1;

/// Rendering of an identity field that the file does not carry
const UNSET: &str = "<unset>";

/// Table name used in errors about the record itself
const METADATA: &str = "<metadata>";

/// The LMDB unnamed database, where the record lives
pub(crate) type ReservedDb = Database<Bytes, Bytes>;

// =============================================================================
// In-memory Record
// =============================================================================

/// Identity and table list of one Yuna file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub name: Option<String>,
    pub version: Option<i64>,
    /// Tables in creation order
    pub tables: Vec<TableDescriptor>,
}

/// How one table's keys and values are encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub key_format: KeyFormat,
    pub serialize: SerializeFormat,
    pub compress: CompressFormat,
    pub version: Option<i64>,
}

impl Metadata {
    /// Fresh record for a newly created file
    pub fn new(name: Option<String>, version: Option<i64>) -> Self {
        Self {
            name,
            version,
            tables: Vec::new(),
        }
    }

    /// Look up a table descriptor by name
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table names in creation order
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Encode the record as stored on disk
    pub fn encode(&self) -> Result<Vec<u8>> {
        let raw = RawMetadata {
            name: self.name.clone(),
            version: self.version.map(RawVersion::Int),
            yuna_version: META_LAYOUT_VERSION,
            tables: self
                .tables
                .iter()
                .map(|t| RawTableDescriptor {
                    name: Some(t.name.clone()),
                    key_serialize: Some(t.key_format.as_tag().to_string()),
                    serialize: Some(t.serialize.as_tag().to_string()),
                    compress: Some(t.compress.as_tag().to_string()),
                    version: t.version,
                })
                .collect::<Vec<_>>()
                .into(),
        };
        serde_json::to_vec(&raw).map_err(|e| YunaError::Serialization {
            table: METADATA.to_string(),
            key: META_KEY.to_string(),
            source: e.into(),
        })
    }

    /// Decode a stored record.
    ///
    /// Anything that is not the expected shape is `CorruptMetadata`; a
    /// well-formed record naming a codec this build does not know is
    /// `UnknownCodec`.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self> {
        let corrupt = |reason: String| YunaError::CorruptMetadata {
            path: path.to_path_buf(),
            reason,
        };

        let raw: RawMetadata = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
        if raw.yuna_version > META_LAYOUT_VERSION {
            return Err(corrupt(format!(
                "unsupported metadata layout version {} (this build reads up to {})",
                raw.yuna_version, META_LAYOUT_VERSION
            )));
        }

        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        for (listed_as, t) in raw.tables.into_entries() {
            let name = match (t.name, listed_as) {
                (Some(name), Some(key)) if name != key => {
                    return Err(corrupt(format!("table '{}' listed under '{}'", name, key)));
                }
                (Some(name), _) | (None, Some(name)) => name,
                (None, None) => return Err(corrupt("table without a name".to_string())),
            };
            if name.is_empty() {
                return Err(corrupt("table with empty name".to_string()));
            }
            if !seen.insert(name.clone()) {
                return Err(corrupt(format!("table '{}' listed twice", name)));
            }
            let serialize = t
                .serialize
                .ok_or_else(|| corrupt(format!("table '{}' has no serialization format", name)))?;
            tables.push(TableDescriptor {
                key_format: t
                    .key_serialize
                    .as_deref()
                    .map_or(Ok(KeyFormat::Str), KeyFormat::from_tag)?,
                serialize: SerializeFormat::from_tag(&serialize)?,
                compress: t
                    .compress
                    .as_deref()
                    .map_or(Ok(CompressFormat::None), CompressFormat::from_tag)?,
                name,
                version: t.version,
            });
        }

        let version = match raw.version {
            None => None,
            Some(RawVersion::Int(v)) => Some(v),
            Some(RawVersion::Text(text)) => Some(
                text.trim()
                    .parse::<i64>()
                    .map_err(|_| corrupt(format!("version '{}' is not an integer", text)))?,
            ),
        };

        Ok(Self {
            name: raw.name,
            version,
            tables,
        })
    }
}

// =============================================================================
// On-disk Shape
// =============================================================================

// Files written by older Yuna releases keep `tables` as an object keyed by
// table name, may leave codec tags `null`, and may store the version as a
// string. All of that is accepted on read; this crate always writes a list.

#[derive(Serialize, Deserialize)]
struct RawMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<RawVersion>,
    yuna_version: u32,
    tables: RawTables,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Int(i64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTables {
    List(Vec<RawTableDescriptor>),
    Map(BTreeMap<String, RawTableDescriptor>),
}

impl From<Vec<RawTableDescriptor>> for RawTables {
    fn from(list: Vec<RawTableDescriptor>) -> Self {
        RawTables::List(list)
    }
}

impl RawTables {
    /// Descriptors paired with the map key they were listed under, if any
    fn into_entries(self) -> Vec<(Option<String>, RawTableDescriptor)> {
        match self {
            RawTables::List(list) => list.into_iter().map(|t| (None, t)).collect(),
            RawTables::Map(map) => map.into_iter().map(|(k, t)| (Some(k), t)).collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawTableDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    key_serialize: Option<String>,
    #[serde(default)]
    serialize: Option<String>,
    #[serde(default)]
    compress: Option<String>,
    #[serde(default)]
    version: Option<i64>,
}

// =============================================================================
// LMDB Access
// =============================================================================

/// Open LMDB's unnamed database
pub(crate) fn reserved_db(env: &Env, rtxn: &RoTxn) -> Result<ReservedDb> {
    // The unnamed database always exists once the environment is open.
    env.open_database::<Bytes, Bytes>(rtxn, None)?
        .ok_or_else(|| YunaError::NoMetadata(env.path().to_path_buf()))
}

/// Read the record in its own read transaction
pub fn read(env: &Env, path: &Path) -> Result<Metadata> {
    let rtxn = env.read_txn()?;
    let reserved = reserved_db(env, &rtxn)?;
    read_in(&rtxn, reserved, path)
}

/// Read the record inside an existing transaction
pub(crate) fn read_in(rtxn: &RoTxn, reserved: ReservedDb, path: &Path) -> Result<Metadata> {
    match reserved.get(rtxn, META_KEY.as_bytes())? {
        Some(bytes) => Metadata::decode(bytes, path),
        None => Err(YunaError::NoMetadata(path.to_path_buf())),
    }
}

/// Write the whole record in its own write transaction
pub fn write(env: &Env, record: &Metadata) -> Result<()> {
    let mut wtxn = env.write_txn()?;
    let reserved = env.create_database::<Bytes, Bytes>(&mut wtxn, None)?;
    write_in(&mut wtxn, reserved, record)?;
    wtxn.commit()?;
    Ok(())
}

/// Write the whole record inside an existing write transaction
pub(crate) fn write_in(wtxn: &mut RwTxn, reserved: ReservedDb, record: &Metadata) -> Result<()> {
    let bytes = record.encode()?;
    reserved.put(wtxn, META_KEY.as_bytes(), &bytes)?;
    Ok(())
}

// =============================================================================
// Identity Check
// =============================================================================

/// Check the record against what the caller expects. Either expectation may
/// be omitted to skip that check.
pub fn validate(
    record: &Metadata,
    expected_name: Option<&str>,
    expected_version: Option<i64>,
) -> Result<()> {
    if let Some(expected) = expected_name {
        if record.name.as_deref() != Some(expected) {
            return Err(YunaError::IdentityMismatch {
                field: "name",
                expected: expected.to_string(),
                actual: record.name.clone().unwrap_or_else(|| UNSET.to_string()),
            });
        }
    }

    if let Some(expected) = expected_version {
        if record.version != Some(expected) {
            return Err(YunaError::IdentityMismatch {
                field: "version",
                expected: expected.to_string(),
                actual: record
                    .version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| UNSET.to_string()),
            });
        }
    }

    Ok(())
}
