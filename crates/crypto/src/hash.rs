//! Content hashes of signed documents
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CryptoError, Result};

/// Length in bytes of a document hash
pub const DOCUMENT_HASH_LEN: usize = 32;

/// SHA-256 hash of a document's content, computed by the content-addressing
/// layer and treated here as an opaque fixed-length value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHash([u8; DOCUMENT_HASH_LEN]);

impl DocumentHash {
    /// Wrap raw hash bytes
    pub fn new(bytes: [u8; DOCUMENT_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; DOCUMENT_HASH_LEN] {
        &self.0
    }

    /// Lowercase hex, no prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;
        let bytes: [u8; DOCUMENT_HASH_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidHash(format!(
                "expected {} bytes, got {}",
                DOCUMENT_HASH_LEN,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentHash({})", self.to_hex())
    }
}

impl fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for DocumentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocumentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 of arbitrary bytes
pub fn sha256(data: &[u8]) -> DocumentHash {
    DocumentHash(Sha256::digest(data).into())
}
