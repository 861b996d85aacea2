//! Cryptographic primitives for Voty
//!
//! Document hashing and the wallet signature scheme used to prove
//! authorship of governance documents.

pub mod error;
pub mod eth;
pub mod hash;

pub use error::{CryptoError, Result};
pub use eth::{recover_personal_signer, EthAddress, PersonalSigner};
pub use hash::{sha256, DocumentHash};
