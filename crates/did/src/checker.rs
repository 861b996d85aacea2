//! Chain-specific authorship checkers
use async_trait::async_trait;
use tracing::debug;
use voty_common::{ChainRef, Did, Error, Pin, Result};
use voty_crypto::eth::{decode_signature, recover_personal_signer, EthAddress};
use voty_crypto::DocumentHash;

use crate::authorship::{Proof, ProofKind};

/// Capability every supported DID family provides.
///
/// New chains are supported by registering another implementation with the
/// [`AuthorshipVerifier`](crate::AuthorshipVerifier); the dispatcher itself
/// never changes.
#[async_trait]
pub trait DidChecker: Send + Sync {
    /// DID suffix this checker handles, without the leading dot
    fn suffix(&self) -> &'static str;

    /// The chain whose signature scheme must back `did`
    fn required_coin_type(&self, did: &Did) -> ChainRef;

    /// Whether `proof` is a valid signature over `hash` by the address bound
    /// to `did` on `coin_type` as of `pin`.
    ///
    /// `Ok(false)` means the proof does not hold; `Err` means the binding
    /// could not be looked up.
    async fn check(
        &self,
        did: &Did,
        coin_type: ChainRef,
        pin: Pin,
        proof: &Proof,
        hash: &DocumentHash,
    ) -> Result<bool>;
}

/// Check a `personal_sign` proof against the address a DID is bound to
pub(crate) fn check_personal_sign(
    bound_address: &str,
    proof: &Proof,
    hash: &DocumentHash,
) -> Result<bool> {
    match proof.kind {
        ProofKind::EthPersonalSign => {}
    }

    let bound: EthAddress = bound_address.parse()?;
    let claimed: EthAddress = proof.address.parse()?;
    if claimed != bound {
        debug!("Proof address {} is not bound address {}", claimed, bound);
        return Ok(false);
    }

    let message = proof.message(hash)?;
    let signature = decode_signature(&proof.signature)?;
    match recover_personal_signer(message.as_bytes(), &signature) {
        Ok(signer) => Ok(signer == bound),
        Err(e) => {
            debug!("Signature recovery failed: {}", e);
            Ok(false)
        }
    }
}

/// Every label of a dotted name must be non-empty and free of whitespace
pub(crate) fn ensure_well_formed(did: &Did) -> Result<()> {
    let well_formed = did
        .as_str()
        .split('.')
        .all(|label| !label.is_empty() && !label.chars().any(char::is_whitespace));

    if well_formed {
        Ok(())
    } else {
        Err(Error::invalid_proof(format!("malformed DID: {}", did)))
    }
}
