//! Ethereum `personal_sign` signatures (EIP-191) over secp256k1

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::error::{CryptoError, Result};

/// Length of an encoded recoverable signature: r || s || v
pub const SIGNATURE_LEN: usize = 65;

/// A 20-byte Ethereum account address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthAddress([u8; 20]);

impl EthAddress {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derive the address controlled by a public key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // Skip the 0x04 uncompressed-point tag
        let digest = keccak256(&point.as_bytes()[1..]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }
}

impl FromStr for EthAddress {
    type Err = CryptoError;

    /// Parse a `0x`-prefixed hex address. Checksum casing is not enforced.
    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| CryptoError::InvalidAddress(format!("missing 0x prefix: {}", s)))?;
        let bytes = hex::decode(hex_part).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|v: Vec<u8>| {
            CryptoError::InvalidAddress(format!("expected 20 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self)
    }
}

impl Serialize for EthAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EthAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Keccak-256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// The digest a wallet signs for `personal_sign(message)`
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Decode a hex signature, with or without a `0x` prefix
pub fn decode_signature(s: &str) -> Result<[u8; SIGNATURE_LEN]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        CryptoError::InvalidSignature(format!("expected {} bytes, got {}", SIGNATURE_LEN, v.len()))
    })
}

/// Recover the address that produced `signature` over `personal_sign(message)`.
///
/// Accepts both the raw (0/1) and the legacy (27/28) encodings of `v`.
/// High-S signatures are rejected.
pub fn recover_personal_signer(message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> Result<EthAddress> {
    let v = match signature[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        other => {
            return Err(CryptoError::InvalidSignature(format!(
                "unsupported recovery byte {}",
                other
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::InvalidSignature(format!("invalid recovery id {}", v)))?;
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    let digest = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;

    Ok(EthAddress::from_verifying_key(&key))
}

/// Wallet-side signer producing `personal_sign` signatures
pub struct PersonalSigner {
    key: SigningKey,
}

impl PersonalSigner {
    /// Create a signer from a 32-byte secret scalar
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Address controlled by this signer
    pub fn address(&self) -> EthAddress {
        EthAddress::from_verifying_key(self.key.verifying_key())
    }

    /// Sign `message` and return the 65-byte signature as `0x` hex with
    /// `v` in the legacy 27/28 encoding
    pub fn sign(&self, message: &[u8]) -> Result<String> {
        let digest = personal_message_hash(message);
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
        bytes.extend_from_slice(&sig.to_bytes());
        bytes.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

impl fmt::Debug for PersonalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersonalSigner(address: {})", self.address())
    }
}
