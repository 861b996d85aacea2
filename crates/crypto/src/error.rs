//! Error types for cryptographic operations

use thiserror::Error;
use voty_common::Error as CommonError;

/// Error type for cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid signature encoding
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Invalid address encoding
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid hash encoding
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Public key recovery failed
    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

impl From<CryptoError> for CommonError {
    fn from(err: CryptoError) -> Self {
        CommonError::invalid_proof(err.to_string())
    }
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;
