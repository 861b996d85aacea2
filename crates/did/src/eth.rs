//! `.eth` names (ENS)
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use voty_common::{ChainRef, Did, Pin, Result};
use voty_crypto::DocumentHash;

use crate::authorship::Proof;
use crate::checker::{check_personal_sign, ensure_well_formed, DidChecker};
use crate::resolver::AddressResolver;

/// Checks ENS names: the name must resolve on Ethereum at the pinned block
/// to the account that signed the proof
pub struct EthChecker {
    resolver: Arc<dyn AddressResolver>,
}

impl EthChecker {
    pub fn new(resolver: Arc<dyn AddressResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl DidChecker for EthChecker {
    fn suffix(&self) -> &'static str {
        "eth"
    }

    fn required_coin_type(&self, _did: &Did) -> ChainRef {
        ChainRef::ETH
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

        match self.resolver.resolve_address(did, coin_type, pin).await? {
            Some(address) => check_personal_sign(&address, proof, hash),
            None => {
                debug!("{} does not resolve at block {}", did, pin);
                Ok(false)
            }
        }
    }
}
