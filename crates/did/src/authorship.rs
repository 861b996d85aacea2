//! Authorship claims and the proofs attached to signed documents

use serde::{Deserialize, Serialize};
use voty_common::{ChainRef, Did, Error, Pin, Result};
use voty_crypto::{DocumentHash, PersonalSigner};

/// Placeholder in a proof template that is replaced by the document hash
pub const HASH_PLACEHOLDER: &str = "{sha256}";

/// The identity claiming a document and the chain state it claims at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorship {
    /// The claimed identity
    pub did: Did,
    /// Chain whose signature scheme proves control of the DID
    pub coin_type: ChainRef,
    /// Pin of `coin_type` at which the DID binding is checked
    pub snapshot: Pin,
}

impl Authorship {
    pub fn new(did: impl Into<Did>, coin_type: ChainRef, snapshot: Pin) -> Self {
        Self {
            did: did.into(),
            coin_type,
            snapshot,
        }
    }
}

/// Signature schemes a proof can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    /// EIP-191 `personal_sign` by an Ethereum-style account
    EthPersonalSign,
}

/// A wallet signature over a message that embeds the document hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(rename = "type")]
    pub kind: ProofKind,
    /// Address the signer claims to control
    pub address: String,
    /// Human-readable message containing [`HASH_PLACEHOLDER`]
    pub template: String,
    /// Hex-encoded signature
    pub signature: String,
}

impl Proof {
    /// The exact message that was signed for `hash`
    pub fn message(&self, hash: &DocumentHash) -> Result<String> {
        if !self.template.contains(HASH_PLACEHOLDER) {
            return Err(Error::invalid_proof(format!(
                "template does not contain {}",
                HASH_PLACEHOLDER
            )));
        }
        Ok(self.template.replace(HASH_PLACEHOLDER, &hash.to_hex()))
    }

    /// Produce a `personal_sign` proof for `hash` as a wallet would
    pub fn personal_sign(
        signer: &PersonalSigner,
        template: impl Into<String>,
        hash: &DocumentHash,
    ) -> Result<Self> {
        let mut proof = Self {
            kind: ProofKind::EthPersonalSign,
            address: signer.address().to_string(),
            template: template.into(),
            signature: String::new(),
        };
        let message = proof.message(hash)?;
        proof.signature = signer.sign(message.as_bytes())?;
        Ok(proof)
    }
}
