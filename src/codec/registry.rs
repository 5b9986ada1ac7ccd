//! Codec Registry
//!
//! Maps each format id to its encode/decode function pair. Lookup happens
//! once, when a table is opened; the table keeps the resolved function
//! pointers for the rest of its life.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::{CodecError, Result, YunaError};

use super::{compress, serialize, CompressFormat, SerializeFormat};

/// Turns a value into bytes
pub type SerializeFn = fn(&Value) -> std::result::Result<Vec<u8>, CodecError>;

/// Turns bytes back into a value
pub type DeserializeFn = fn(&[u8]) -> std::result::Result<Value, CodecError>;

/// Compresses or decompresses bytes
pub type CompressFn = fn(&[u8]) -> std::result::Result<Vec<u8>, CodecError>;

/// Encode/decode pair for one serialization format
#[derive(Clone, Copy)]
pub struct SerializeCodec {
    pub serialize: SerializeFn,
    pub deserialize: DeserializeFn,
}

/// Encode/decode pair for one compression format
#[derive(Clone, Copy)]
pub struct CompressCodec {
    pub compress: CompressFn,
    pub decompress: CompressFn,
}

impl fmt::Debug for SerializeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializeCodec").finish_non_exhaustive()
    }
}

impl fmt::Debug for CompressCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressCodec").finish_non_exhaustive()
    }
}

/// A table's full value pipeline: `compress(serialize(v))` on the way in,
/// `deserialize(decompress(b))` on the way out.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    serialize: SerializeCodec,
    compress: CompressCodec,
}

impl Pipeline {
    pub fn encode(&self, value: &Value) -> std::result::Result<Vec<u8>, CodecError> {
        let bytes = (self.serialize.serialize)(value)?;
        (self.compress.compress)(&bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<Value, CodecError> {
        let bytes = (self.compress.decompress)(bytes)?;
        (self.serialize.deserialize)(&bytes)
    }
}

/// Registry of available codecs
#[derive(Clone)]
pub struct CodecRegistry {
    serializers: HashMap<SerializeFormat, SerializeCodec>,
    compressors: HashMap<CompressFormat, CompressCodec>,
}

impl CodecRegistry {
    /// A registry with no codecs at all
    pub fn empty() -> Self {
        Self {
            serializers: HashMap::new(),
            compressors: HashMap::new(),
        }
    }

    /// Add or replace a serialization codec. Returns the codec it replaced.
    pub fn register_serialize(
        &mut self,
        format: SerializeFormat,
        serialize: SerializeFn,
        deserialize: DeserializeFn,
    ) -> Option<SerializeCodec> {
        self.serializers.insert(
            format,
            SerializeCodec {
                serialize,
                deserialize,
            },
        )
    }

    /// Add or replace a compression codec. Returns the codec it replaced.
    pub fn register_compress(
        &mut self,
        format: CompressFormat,
        compress: CompressFn,
        decompress: CompressFn,
    ) -> Option<CompressCodec> {
        self.compressors.insert(
            format,
            CompressCodec {
                compress,
                decompress,
            },
        )
    }

    pub fn resolve_serialize(&self, format: SerializeFormat) -> Result<SerializeCodec> {
        self.serializers
            .get(&format)
            .copied()
            .ok_or_else(|| YunaError::UnknownCodec {
                kind: "serialization",
                tag: format.as_tag().to_string(),
            })
    }

    pub fn resolve_compress(&self, format: CompressFormat) -> Result<CompressCodec> {
        self.compressors
            .get(&format)
            .copied()
            .ok_or_else(|| YunaError::UnknownCodec {
                kind: "compression",
                tag: format.as_tag().to_string(),
            })
    }

    /// Resolve both halves of a table's pipeline
    pub fn pipeline(&self, serialize: SerializeFormat, compress: CompressFormat) -> Result<Pipeline> {
        Ok(Pipeline {
            serialize: self.resolve_serialize(serialize)?,
            compress: self.resolve_compress(compress)?,
        })
    }

    /// Whether a serialization format is registered
    pub fn has_serialize(&self, format: SerializeFormat) -> bool {
        self.serializers.contains_key(&format)
    }

    /// Whether a compression format is registered
    pub fn has_compress(&self, format: CompressFormat) -> bool {
        self.compressors.contains_key(&format)
    }
}

impl Default for CodecRegistry {
    /// Every built-in codec compiled into this build
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register_serialize(
            SerializeFormat::Str,
            serialize::serialize_str,
            serialize::deserialize_str,
        );
        registry.register_serialize(
            SerializeFormat::Json,
            serialize::serialize_json,
            serialize::deserialize_json,
        );
        #[cfg(feature = "msgpack")]
        registry.register_serialize(
            SerializeFormat::MsgPack,
            serialize::serialize_msgpack,
            serialize::deserialize_msgpack,
        );

        registry.register_compress(CompressFormat::None, compress::identity, compress::identity);
        #[cfg(feature = "lz4")]
        registry.register_compress(
            CompressFormat::Lz4,
            compress::compress_lz4,
            compress::decompress_lz4,
        );
        #[cfg(feature = "zlib")]
        registry.register_compress(
            CompressFormat::Zlib,
            compress::compress_zlib,
            compress::decompress_zlib,
        );
        #[cfg(feature = "zstd")]
        registry.register_compress(
            CompressFormat::Zstd,
            compress::compress_zstd,
            compress::decompress_zstd,
        );

        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializers: Vec<_> = self.serializers.keys().map(|k| k.as_tag()).collect();
        let mut compressors: Vec<_> = self.compressors.keys().map(|k| k.as_tag()).collect();
        serializers.sort_unstable();
        compressors.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("serializers", &serializers)
            .field("compressors", &compressors)
            .finish()
    }
}
