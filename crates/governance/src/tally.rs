//! Turning accepted votes into per-option power
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use voty_common::{Did, Error, Result};

use crate::choice::{choice_is_empty, power_of_choice, Choice, VotingType};

/// Power a single vote adds to each option it selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyIncrements {
    pub proposal: String,
    pub author: Did,
    pub power: Decimal,
    pub increments: BTreeMap<String, Decimal>,
}

/// Computes the increments of a vote.
///
/// This is a pure calculator: it does not know whether the author has voted
/// before. One vote per (proposal, author) is enforced where the increments
/// are applied, see [`TallyStore`](crate::TallyStore).
pub struct VoteTally;

impl VoteTally {
    /// Increments for a vote of `power` by `identity` selecting `choice`.
    ///
    /// The increments are non-negative and sum to exactly `power`.
    pub fn accept(
        proposal: &str,
        identity: &Did,
        choice: &Choice,
        voting_type: VotingType,
        power: Decimal,
    ) -> Result<TallyIncrements> {
        if choice_is_empty(voting_type, choice)? {
            return Err(Error::invalid_vote(format!("{} selected no option", identity)));
        }

        let increments = power_of_choice(voting_type, choice, power)?;
        debug!("Vote by {} on {} adds {:?}", identity, proposal, increments);

        Ok(TallyIncrements {
            proposal: proposal.to_string(),
            author: identity.clone(),
            power,
            increments,
        })
    }
}

/// Running totals for one proposal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub proposal: String,
    pub options: BTreeMap<String, Decimal>,
    pub total: Decimal,
    pub votes: u64,
}

impl Tally {
    pub fn new(proposal: impl Into<String>) -> Self {
        Self {
            proposal: proposal.into(),
            ..Default::default()
        }
    }

    /// Add a vote's increments; totals only ever grow
    pub fn apply(&mut self, vote: &TallyIncrements) -> Result<()> {
        if vote.proposal != self.proposal {
            return Err(Error::invalid_vote(format!(
                "vote for {} applied to tally of {}",
                vote.proposal, self.proposal
            )));
        }

        let mut options = self.options.clone();
        for (option, power) in &vote.increments {
            let current = options.entry(option.clone()).or_insert(Decimal::ZERO);
            *current = checked_add(*current, *power)?;
        }
        let total = checked_add(self.total, vote.power)?;

        self.options = options;
        self.total = total;
        self.votes += 1;
        Ok(())
    }

    /// Power accumulated by `option`
    pub fn power_of(&self, option: &str) -> Decimal {
        self.options.get(option).copied().unwrap_or(Decimal::ZERO)
    }

    /// Share of all power `option` would have if a vote of `power` selecting
    /// `choice` were added, as a fraction between 0 and 1
    pub fn projected_share(
        &self,
        voting_type: VotingType,
        choice: &Choice,
        power: Decimal,
        option: &str,
    ) -> Result<Decimal> {
        let contribution = power_of_choice(voting_type, choice, power)?;
        let added = if contribution.is_empty() { Decimal::ZERO } else { power };

        let numerator = checked_add(
            self.power_of(option),
            contribution.get(option).copied().unwrap_or(Decimal::ZERO),
        )?;
        let denominator = checked_add(self.total, added)?;

        if denominator.is_zero() {
            return Ok(Decimal::ZERO);
        }
        numerator
            .checked_div(denominator)
            .ok_or_else(|| Error::precision_overflow(format!("{} / {}", numerator, denominator)))
    }
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| Error::precision_overflow(format!("{} + {}", a, b)))
}
