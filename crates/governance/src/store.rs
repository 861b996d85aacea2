//! Applying vote increments
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;
use voty_common::{Did, Error, Result};

use crate::tally::{Tally, TallyIncrements};

/// Storage for tallies and the votes behind them.
///
/// `record_vote` must be atomic: either the vote is recorded and every
/// increment applied, or nothing changes. A second vote by the same author
/// on the same proposal fails with `DuplicateVote`. Concurrent votes on the
/// same proposal must all be counted.
#[async_trait]
pub trait TallyStore: Send + Sync {
    async fn record_vote(&self, vote: &TallyIncrements) -> Result<()>;

    /// Current totals for `proposal`; empty if nobody voted yet
    async fn tally(&self, proposal: &str) -> Result<Tally>;

    /// Power each of `authors` voted with on `proposal`, for those who voted
    async fn powers_of(&self, proposal: &str, authors: &[Did]) -> Result<BTreeMap<Did, Decimal>>;
}

#[derive(Debug, Default)]
struct StoreState {
    tallies: HashMap<String, Tally>,
    votes: HashMap<(String, Did), Decimal>,
}

/// Tally store held in memory
#[derive(Debug, Default)]
pub struct MemoryTallyStore {
    state: Mutex<StoreState>,
}

impl MemoryTallyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TallyStore for MemoryTallyStore {
    async fn record_vote(&self, vote: &TallyIncrements) -> Result<()> {
        let mut state = self.state.lock().await;

        let key = (vote.proposal.clone(), vote.author.clone());
        if state.votes.contains_key(&key) {
            return Err(Error::DuplicateVote {
                proposal: vote.proposal.clone(),
                author: vote.author.to_string(),
            });
        }

        let mut tally = state
            .tallies
            .get(&vote.proposal)
            .cloned()
            .unwrap_or_else(|| Tally::new(vote.proposal.clone()));
        tally.apply(vote)?;

        state.tallies.insert(vote.proposal.clone(), tally);
        state.votes.insert(key, vote.power);

        info!("Recorded vote by {} on {} with power {}", vote.author, vote.proposal, vote.power);
        Ok(())
    }

    async fn tally(&self, proposal: &str) -> Result<Tally> {
        let state = self.state.lock().await;
        Ok(state
            .tallies
            .get(proposal)
            .cloned()
            .unwrap_or_else(|| Tally::new(proposal)))
    }

    async fn powers_of(&self, proposal: &str, authors: &[Did]) -> Result<BTreeMap<Did, Decimal>> {
        let state = self.state.lock().await;
        Ok(authors
            .iter()
            .filter_map(|author| {
                state
                    .votes
                    .get(&(proposal.to_string(), author.clone()))
                    .map(|power| (author.clone(), *power))
            })
            .collect())
    }
}
