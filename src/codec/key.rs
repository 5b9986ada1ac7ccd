//! Key encoding
//!
//! Keys are stored as UTF-8 bytes. The format is recorded per table so that
//! an integer-key encoding can be introduced later without reinterpreting
//! existing files.

use crate::error::{Result, YunaError};

/// Key encoding format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyFormat {
    /// UTF-8 string keys
    #[default]
    Str,
}

impl KeyFormat {
    /// On-disk tag
    pub fn as_tag(&self) -> &'static str {
        match self {
            KeyFormat::Str => "str",
        }
    }

    /// Parse an on-disk tag
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "str" => Ok(KeyFormat::Str),
            other => Err(YunaError::UnknownCodec {
                kind: "key",
                tag: other.to_string(),
            }),
        }
    }

    /// Encode a key for LMDB. LMDB rejects zero-length keys.
    pub fn encode<'k>(&self, key: &'k str) -> Result<&'k [u8]> {
        match self {
            KeyFormat::Str => encode_raw_key(key.as_bytes()),
        }
    }

    /// Decode a key read back from LMDB
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            KeyFormat::Str => String::from_utf8(bytes.to_vec()).map_err(|e| {
                YunaError::InvalidKey(format!("stored key is not UTF-8: {}", e))
            }),
        }
    }
}

pub(crate) fn encode_raw_key(key: &[u8]) -> Result<&[u8]> {
    if key.is_empty() {
        return Err(YunaError::InvalidKey("key cannot be empty".to_string()));
    }
    Ok(key)
}
