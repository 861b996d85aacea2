//! Contract for reading chain state
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use voty_common::{ChainRef, Error, Pin, Result};

use crate::operand::Criterion;

/// Read access to the chains permissions are evaluated against.
///
/// Implementations talk to chain RPC endpoints or indexers. A read that
/// cannot be completed must fail with a retryable error (`ChainRead` or
/// `SnapshotUnavailable`); a read that completes returns the holding, which
/// may be zero.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// The latest pin of `chain` no later than `at`
    async fn latest_pin(&self, chain: ChainRef, at: DateTime<Utc>) -> Result<Pin>;

    /// Balance, token count or membership weight of `address` for
    /// `criterion` on `chain` as of `pin`
    async fn read(
        &self,
        chain: ChainRef,
        pin: Pin,
        address: &str,
        criterion: &Criterion,
    ) -> Result<Decimal>;
}

type HoldingKey = (ChainRef, String, Criterion);

/// In-memory chain state for development and tests.
///
/// Holdings are recorded from a height onwards, so reads at older pins see
/// older state. Every call can be slowed down with a fixed latency, and the
/// reader tracks how many calls were outstanding at once.
#[derive(Debug, Default)]
pub struct StaticChainReader {
    latest: RwLock<HashMap<ChainRef, Pin>>,
    holdings: RwLock<HashMap<HoldingKey, Vec<(Pin, Decimal)>>>,
    failing: RwLock<Vec<ChainRef>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StaticChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set the head of `chain`
    pub fn set_latest(&self, chain: ChainRef, pin: Pin) {
        self.latest
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chain, pin);
    }

    /// Record that `address` holds `amount` for `criterion` from `since` onwards
    pub fn set_holding(
        &self,
        chain: ChainRef,
        address: &str,
        criterion: &Criterion,
        since: Pin,
        amount: Decimal,
    ) {
        let key = (chain, address.to_lowercase(), criterion.clone());
        let mut holdings = self.holdings.write().unwrap_or_else(|e| e.into_inner());
        let history = holdings.entry(key).or_default();
        history.push((since, amount));
        history.sort_by_key(|(pin, _)| *pin);
    }

    /// Make every call on `chain` fail
    pub fn fail_chain(&self, chain: ChainRef) {
        self.failing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(chain);
    }

    /// Number of calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Largest number of calls that were outstanding at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, chain: ChainRef) -> Result<InFlight<'_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self
            .failing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&chain)
        {
            return Err(Error::chain_read(chain, "node unreachable"));
        }
        Ok(guard)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainStateReader for StaticChainReader {
    async fn latest_pin(&self, chain: ChainRef, _at: DateTime<Utc>) -> Result<Pin> {
        let _guard = self.enter(chain).await?;
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&chain)
            .copied()
            .ok_or_else(|| Error::chain_read(chain, "chain has no blocks"))
    }

    async fn read(
        &self,
        chain: ChainRef,
        pin: Pin,
        address: &str,
        criterion: &Criterion,
    ) -> Result<Decimal> {
        let _guard = self.enter(chain).await?;
        let key = (chain, address.to_lowercase(), criterion.clone());
        let holdings = self.holdings.read().unwrap_or_else(|e| e.into_inner());
        Ok(holdings
            .get(&key)
            .and_then(|history| history.iter().rev().find(|(since, _)| *since <= pin))
            .map(|(_, amount)| *amount)
            .unwrap_or(Decimal::ZERO))
    }
}
