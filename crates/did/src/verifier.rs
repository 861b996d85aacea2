//! Dispatch of authorship proofs to the checker for the DID's chain family

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use voty_common::{ChainRef, Did, Error, Result};
use voty_crypto::DocumentHash;

use crate::authorship::{Authorship, Proof};
use crate::bit::BitChecker;
use crate::checker::DidChecker;
use crate::eth::EthChecker;
use crate::resolver::AddressResolver;

/// Verifies that a document was signed by the identity it claims.
///
/// Checkers are looked up by DID suffix. Each call is terminal in one step:
/// it either returns `Ok(())` or fails with `UnsupportedDid` or
/// `InvalidProof`.
#[derive(Clone, Default)]
pub struct AuthorshipVerifier {
    checkers: HashMap<&'static str, Arc<dyn DidChecker>>,
}

impl AuthorshipVerifier {
    /// A verifier with no checkers registered
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier for `.eth` and `.bit` identities
    pub fn with_default_checkers(resolver: Arc<dyn AddressResolver>) -> Self {
        let mut verifier = Self::new();
        verifier.register(Arc::new(EthChecker::new(resolver.clone())));
        verifier.register(Arc::new(BitChecker::new(resolver)));
        verifier
    }

    /// Register a checker for its suffix, returning any checker it replaces
    pub fn register(&mut self, checker: Arc<dyn DidChecker>) -> Option<Arc<dyn DidChecker>> {
        self.checkers.insert(checker.suffix(), checker)
    }

    /// Suffixes with a registered checker
    pub fn supported_suffixes(&self) -> Vec<&'static str> {
        let mut suffixes: Vec<_> = self.checkers.keys().copied().collect();
        suffixes.sort_unstable();
        suffixes
    }

    fn checker_for(&self, did: &Did) -> Result<&Arc<dyn DidChecker>> {
        did.suffix()
            .and_then(|suffix| self.checkers.get(suffix))
            .ok_or_else(|| Error::unsupported_did(did.as_str()))
    }

    /// The chain that must be pinned to verify proofs by `did`
    pub fn required_coin_type(&self, did: &Did) -> Result<ChainRef> {
        Ok(self.checker_for(did)?.required_coin_type(did))
    }

    /// Verify `proof` over `hash` for the claimed `authorship`
    pub async fn verify(&self, authorship: &Authorship, proof: &Proof, hash: &DocumentHash) -> Result<()> {
        let did = &authorship.did;
        let checker = self.checker_for(did)?;

        let required = checker.required_coin_type(did);
        if authorship.coin_type != required {
            warn!(
                "Rejecting {}: declared coin type {} but requires {}",
                did, authorship.coin_type, required
            );
            return Err(Error::invalid_proof(format!(
                "{} requires coin type {}, got {}",
                did, required, authorship.coin_type
            )));
        }

        let valid = checker
            .check(did, authorship.coin_type, authorship.snapshot, proof, hash)
            .await
            .map_err(|e| match e {
                Error::InvalidProof(_) => e,
                other => Error::invalid_proof(format!("lookup for {} failed: {}", did, other)),
            })?;

        if !valid {
            debug!("Proof by {} over {} did not verify", did, hash);
            return Err(Error::invalid_proof(format!("signature does not match {}", did)));
        }

        info!("Verified authorship of {} by {} at {}", hash, did, authorship.snapshot);
        Ok(())
    }
}
