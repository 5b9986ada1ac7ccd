//! Codec Module
//!
//! Serialization and compression formats, and the registry that maps each
//! format id to its encode/decode functions.
//!
//! ## Pipeline
//! ```text
//!   put:  Value ──serialize──▶ bytes ──compress────▶ LMDB
//!   get:  LMDB  ──decompress─▶ bytes ──deserialize─▶ Value
//! ```
//!
//! Format ids are closed enums with a stable lowercase tag. The tag is what
//! gets written into the metadata record, so tags must never change.

mod compress;
mod finite;
mod key;
mod registry;
mod serialize;

pub(crate) use finite::check_finite;
pub(crate) use key::encode_raw_key;
pub use key::KeyFormat;
pub use registry::{
    CodecRegistry, CompressCodec, CompressFn, DeserializeFn, Pipeline, SerializeCodec,
    SerializeFn,
};

use std::fmt;

use crate::error::{Result, YunaError};

/// Value serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializeFormat {
    /// UTF-8 string, stored as-is. Only string values are accepted.
    Str,
    /// JSON text
    Json,
    /// MessagePack
    MsgPack,
}

impl SerializeFormat {
    pub const ALL: [SerializeFormat; 3] = [
        SerializeFormat::Str,
        SerializeFormat::Json,
        SerializeFormat::MsgPack,
    ];

    /// On-disk tag
    pub fn as_tag(&self) -> &'static str {
        match self {
            SerializeFormat::Str => "str",
            SerializeFormat::Json => "json",
            SerializeFormat::MsgPack => "msgpack",
        }
    }

    /// Parse an on-disk tag
    pub fn from_tag(tag: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_tag() == tag)
            .ok_or_else(|| YunaError::UnknownCodec {
                kind: "serialization",
                tag: tag.to_string(),
            })
    }
}

impl fmt::Display for SerializeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Value compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressFormat {
    /// Identity: bytes are stored as serialized
    #[default]
    None,
    /// LZ4 block format with the uncompressed size prepended
    Lz4,
    /// zlib stream
    Zlib,
    /// Zstandard frame
    Zstd,
}

impl CompressFormat {
    pub const ALL: [CompressFormat; 4] = [
        CompressFormat::None,
        CompressFormat::Lz4,
        CompressFormat::Zlib,
        CompressFormat::Zstd,
    ];

    /// On-disk tag
    pub fn as_tag(&self) -> &'static str {
        match self {
            CompressFormat::None => "none",
            CompressFormat::Lz4 => "lz4",
            CompressFormat::Zlib => "zlib",
            CompressFormat::Zstd => "zstd",
        }
    }

    /// Parse an on-disk tag
    pub fn from_tag(tag: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_tag() == tag)
            .ok_or_else(|| YunaError::UnknownCodec {
                kind: "compression",
                tag: tag.to_string(),
            })
    }
}

impl fmt::Display for CompressFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}
