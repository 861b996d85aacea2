//! Pinning chain state for a proposal or voting round
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use voty_common::{ChainRef, Error, Pin, Result, Snapshot, Snapshots};

use crate::reader::ChainStateReader;

/// Pins fetched during one round, keyed by chain and logical time.
///
/// The cache is created when a round starts and dropped when it ends. It is
/// passed explicitly to [`SnapshotResolver::resolve`] and may be shared by
/// concurrent evaluations of the same round.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    pins: RwLock<HashMap<(ChainRef, DateTime<Utc>), Pin>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached pin of `chain` at `at`
    pub async fn get(&self, chain: ChainRef, at: DateTime<Utc>) -> Option<Pin> {
        self.pins.read().await.get(&(chain, at)).copied()
    }

    /// Cache `snapshots` and return the pins the cache holds for them.
    ///
    /// A pin cached by a concurrent resolve of the same round wins over the
    /// freshly fetched one.
    async fn insert_all(&self, at: DateTime<Utc>, snapshots: &[Snapshot]) -> Vec<Snapshot> {
        let mut pins = self.pins.write().await;
        snapshots
            .iter()
            .map(|snapshot| {
                let pin = *pins.entry((snapshot.chain, at)).or_insert(snapshot.pin);
                if pin != snapshot.pin {
                    debug!("Chain {} already pinned at {} for {}, dropping {}", snapshot.chain, pin, at, snapshot.pin);
                }
                Snapshot::new(snapshot.chain, pin)
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.pins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pins.read().await.is_empty()
    }
}

/// Fetches pins for the chains a round depends on
#[derive(Clone)]
pub struct SnapshotResolver {
    reader: Arc<dyn ChainStateReader>,
    concurrency: usize,
}

impl SnapshotResolver {
    /// Create a resolver issuing at most `concurrency` fetches at once
    pub fn new(reader: Arc<dyn ChainStateReader>, concurrency: usize) -> Self {
        Self {
            reader,
            concurrency: concurrency.max(1),
        }
    }

    /// Pin every chain in `chains` at `at`.
    ///
    /// Cached pins are reused. If any fetch fails the whole call fails with
    /// `SnapshotUnavailable` and nothing is added to the cache.
    pub async fn resolve<I>(&self, cache: &SnapshotCache, chains: I, at: DateTime<Utc>) -> Result<Snapshots>
    where
        I: IntoIterator<Item = ChainRef>,
    {
        let chains: BTreeSet<ChainRef> = chains.into_iter().collect();

        let mut snapshots = Snapshots::new();
        let mut missing = Vec::new();
        for chain in chains {
            match cache.get(chain, at).await {
                Some(pin) => {
                    snapshots.insert(Snapshot::new(chain, pin));
                }
                None => missing.push(chain),
            }
        }

        if missing.is_empty() {
            debug!("All {} snapshots cached for {}", snapshots.len(), at);
            return Ok(snapshots);
        }

        let fetched: Vec<Snapshot> = stream::iter(missing)
            .map(|chain| async move {
                match self.reader.latest_pin(chain, at).await {
                    Ok(pin) => Ok(Snapshot::new(chain, pin)),
                    Err(e @ Error::SnapshotUnavailable { .. }) => Err(e),
                    Err(e) => {
                        warn!("Failed to pin chain {}: {}", chain, e);
                        Err(Error::snapshot_unavailable(chain, e.to_string()))
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        for snapshot in cache.insert_all(at, &fetched).await {
            snapshots.insert(snapshot);
        }

        info!("Resolved {} snapshots ({} fetched) for {}", snapshots.len(), fetched.len(), at);
        Ok(snapshots)
    }
}
