//! Mapping DIDs to on-chain addresses
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use voty_common::{ChainRef, Did, Error, Pin, Result};

/// Resolves the address a DID is bound to on a chain at a pinned height
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// `Ok(None)` when the DID has no address on `chain` at `pin`.
    /// Errors only when the lookup itself could not be completed.
    async fn resolve_address(&self, did: &Did, chain: ChainRef, pin: Pin) -> Result<Option<String>>;
}

/// In-memory resolver with fixed bindings, for development and tests.
///
/// A binding made with [`StaticAddressResolver::bind`] applies at every pin;
/// [`StaticAddressResolver::bind_from`] applies from a given height onwards.
#[derive(Debug, Default)]
pub struct StaticAddressResolver {
    bindings: RwLock<HashMap<(Did, ChainRef), Vec<(Pin, String)>>>,
    failing: RwLock<Vec<ChainRef>>,
}

impl StaticAddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `did` to `address` on `chain` at every pin
    pub fn bind(&self, did: impl Into<Did>, chain: ChainRef, address: impl Into<String>) {
        self.bind_from(did, chain, Pin::new(0), address);
    }

    /// Bind `did` to `address` on `chain` from `since` onwards
    pub fn bind_from(&self, did: impl Into<Did>, chain: ChainRef, since: Pin, address: impl Into<String>) {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        let history = bindings.entry((did.into(), chain)).or_default();
        history.push((since, address.into()));
        history.sort_by_key(|(pin, _)| *pin);
    }

    /// Make every lookup on `chain` fail, simulating an unreachable node
    pub fn fail_chain(&self, chain: ChainRef) {
        self.failing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(chain);
    }
}

#[async_trait]
impl AddressResolver for StaticAddressResolver {
    async fn resolve_address(&self, did: &Did, chain: ChainRef, pin: Pin) -> Result<Option<String>> {
        if self
            .failing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&chain)
        {
            return Err(Error::chain_read(chain, format!("address lookup for {} failed", did)));
        }

        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        Ok(bindings.get(&(did.clone(), chain)).and_then(|history| {
            history
                .iter()
                .rev()
                .find(|(since, _)| *since <= pin)
                .map(|(_, address)| address.clone())
        }))
    }
}
