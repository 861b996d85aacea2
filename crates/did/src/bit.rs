//! `.bit` accounts
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use voty_common::{ChainRef, Did, Error, Pin, Result};
use voty_crypto::DocumentHash;

use crate::authorship::Proof;
use crate::checker::{check_personal_sign, ensure_well_formed, DidChecker};
use crate::resolver::AddressResolver;

/// Longest account name accepted, excluding the `.bit` suffix
const MAX_ACCOUNT_LEN: usize = 42;

/// Checks .bit accounts. The registry lives on CKB; the account's owner key
/// is an Ethereum-style key, so proofs are `personal_sign` signatures by the
/// owner address recorded at the pinned CKB block.
pub struct BitChecker {
    resolver: Arc<dyn AddressResolver>,
}

impl BitChecker {
    pub fn new(resolver: Arc<dyn AddressResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl DidChecker for BitChecker {
    fn suffix(&self) -> &'static str {
        "bit"
    }

    fn required_coin_type(&self, _did: &Did) -> ChainRef {
        ChainRef::CKB
    }

    async fn check(
        &self,
        did: &Did,
        coin_type: ChainRef,
        pin: Pin,
        proof: &Proof,
        hash: &DocumentHash,
    ) -> Result<bool> {
        ensure_well_formed(did)?;
        if did.name().chars().count() > MAX_ACCOUNT_LEN {
            return Err(Error::invalid_proof(format!("account name too long: {}", did)));
        }

        match self.resolver.resolve_address(did, coin_type, pin).await? {
            Some(owner) => check_personal_sign(&owner, proof, hash),
            None => {
                debug!("{} has no owner at CKB block {}", did, pin);
                Ok(false)
            }
        }
    }
}
