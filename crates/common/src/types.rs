//! Common types used throughout Voty

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a blockchain, expressed as a SLIP-44 coin type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainRef(u32);

impl ChainRef {
    /// Ethereum mainnet
    pub const ETH: ChainRef = ChainRef(60);
    /// Nervos CKB, home of the .bit registry
    pub const CKB: ChainRef = ChainRef(309);
    /// Polygon
    pub const MATIC: ChainRef = ChainRef(966);

    /// Create a chain reference from a coin type
    pub const fn new(coin_type: u32) -> Self {
        Self(coin_type)
    }

    /// The underlying coin type
    pub const fn coin_type(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ChainRef {
    fn from(coin_type: u32) -> Self {
        Self(coin_type)
    }
}

/// Block height (or equivalent) pinning a chain's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pin(u64);

impl Pin {
    /// Create a pin from a block height
    pub const fn new(height: u64) -> Self {
        Self(height)
    }

    /// The pinned block height
    pub const fn height(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Pin {
    fn from(height: u64) -> Self {
        Self(height)
    }
}

/// A chain pinned at a fixed height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    pub chain: ChainRef,
    pub pin: Pin,
}

impl Snapshot {
    pub fn new(chain: ChainRef, pin: Pin) -> Self {
        Self { chain, pin }
    }
}

/// Pins for every chain a proposal or voting round depends on.
///
/// Once attached to a published proposal the set is never re-resolved, so
/// every later eligibility, power and authorship computation for the round
/// agrees on the same chain state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshots(BTreeMap<ChainRef, Pin>);

impl Snapshots {
    /// Create an empty snapshot set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Pin a chain, returning the previous pin if one existed
    pub fn insert(&mut self, snapshot: Snapshot) -> Option<Pin> {
        self.0.insert(snapshot.chain, snapshot.pin)
    }

    /// Look up the snapshot for a chain
    pub fn get(&self, chain: ChainRef) -> Result<Snapshot> {
        self.0
            .get(&chain)
            .map(|pin| Snapshot::new(chain, *pin))
            .ok_or(Error::MissingSnapshot(chain))
    }

    /// Whether the chain is pinned
    pub fn contains(&self, chain: ChainRef) -> bool {
        self.0.contains_key(&chain)
    }

    /// Fail with `MissingSnapshot` for the first chain that is not pinned
    pub fn ensure_covers<'a, I>(&self, chains: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a ChainRef>,
    {
        for chain in chains {
            if !self.contains(*chain) {
                return Err(Error::MissingSnapshot(*chain));
            }
        }
        Ok(())
    }

    /// Pinned chains in ascending coin type order
    pub fn chains(&self) -> impl Iterator<Item = ChainRef> + '_ {
        self.0.keys().copied()
    }

    /// All snapshots in ascending coin type order
    pub fn iter(&self) -> impl Iterator<Item = Snapshot> + '_ {
        self.0.iter().map(|(chain, pin)| Snapshot::new(*chain, *pin))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Snapshot> for Snapshots {
    fn from_iter<T: IntoIterator<Item = Snapshot>>(iter: T) -> Self {
        Self(iter.into_iter().map(|s| (s.chain, s.pin)).collect())
    }
}

/// A decentralized identity whose suffix names the chain family it lives on,
/// e.g. `alice.eth` or `alice.bit`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Create a new DID
    pub fn new<S: Into<String>>(did: S) -> Self {
        Self(did.into())
    }

    /// Get the DID as a string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The text after the last dot, if any
    pub fn suffix(&self) -> Option<&str> {
        self.0
            .rsplit_once('.')
            .map(|(_, suffix)| suffix)
            .filter(|suffix| !suffix.is_empty())
    }

    /// Whether the DID ends with `.{suffix}`
    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.suffix() == Some(suffix)
    }

    /// The part before the suffix, e.g. `alice` for `alice.eth`
    pub fn name(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map(|(name, _)| name)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Did {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Did {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
