//! Groups, proposals and their voting periods
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use voty_common::{ChainRef, Did, Error, Result, Snapshots};
use voty_did::Authorship;

use crate::algebra::{BooleanSet, DecimalSet, PermissionSet};
use crate::choice::{Choice, VotingType};
use crate::grant::GrantDuration;

/// Who may propose in a group, and how much each vote weighs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub proposing: BooleanSet,
    pub voting: DecimalSet,
}

/// Length of the pending and voting periods, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub pending: u64,
    pub voting: u64,
}

impl Duration {
    pub fn new(pending: u64, voting: u64) -> Self {
        Self { pending, voting }
    }
}

/// A workgroup of a community, with its own permission and schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub community: String,
    pub permission: Permission,
    pub duration: Duration,
}

impl Group {
    /// Check the schedule against `min_period_secs` and the voting set's factors
    pub fn validate(&self, min_period_secs: u64) -> Result<()> {
        if self.id.is_empty() || self.community.is_empty() {
            return Err(Error::invalid_permission("group must name its id and community"));
        }
        for (name, secs) in [("pending", self.duration.pending), ("voting", self.duration.voting)] {
            if secs < min_period_secs {
                return Err(Error::invalid_permission(format!(
                    "{} period of {}s is shorter than {}s",
                    name, secs, min_period_secs
                )));
            }
        }
        self.permission.voting.validate()
    }

    /// Chains either permission set reads from
    pub fn permission_chains(&self) -> BTreeSet<ChainRef> {
        let mut chains = self.permission.proposing.required_chains();
        chains.extend(self.permission.voting.required_chains());
        chains
    }
}

/// Where a proposal is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Pending,
    /// Grants only: proposals may be added as options
    AddingOption,
    Voting,
    Ended,
}

impl Period {
    /// Period at `now` of a proposal created at `created_at`.
    ///
    /// Pending covers `[created_at, created_at + pending)`, voting the
    /// following `voting` seconds; anything later has ended. A `now` before
    /// creation counts as pending.
    pub fn of(created_at: DateTime<Utc>, duration: &Duration, now: DateTime<Utc>) -> Period {
        Self::locate(created_at, now, &[
            (Period::Pending, duration.pending),
            (Period::Voting, duration.voting),
        ])
    }

    /// Period at `now` of a grant created at `created_at`: pending, then
    /// adding options, then voting
    pub fn of_grant(created_at: DateTime<Utc>, duration: &GrantDuration, now: DateTime<Utc>) -> Period {
        Self::locate(created_at, now, &[
            (Period::Pending, duration.pending),
            (Period::AddingOption, duration.adding_option),
            (Period::Voting, duration.voting),
        ])
    }

    fn locate(created_at: DateTime<Utc>, now: DateTime<Utc>, phases: &[(Period, u64)]) -> Period {
        let mut remaining = (now - created_at).num_seconds();
        if remaining < 0 {
            return Period::Pending;
        }
        for (period, secs) in phases {
            let secs = i64::try_from(*secs).unwrap_or(i64::MAX);
            if remaining < secs {
                return *period;
            }
            remaining -= secs;
        }
        Period::Ended
    }
}

/// A proposal as submitted, before its snapshots are pinned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub id: String,
    pub group: String,
    pub authorship: Authorship,
    pub title: String,
    pub voting_type: VotingType,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ProposalDraft {
    /// Options must be non-empty, unique, and at least two
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::invalid_proposal("title is required"));
        }
        validate_options(&self.options)
    }
}

fn validate_options(options: &[String]) -> Result<()> {
    if options.len() < 2 {
        return Err(Error::invalid_proposal("at least two options are required"));
    }
    let mut seen = BTreeSet::new();
    for option in options {
        if option.trim().is_empty() {
            return Err(Error::invalid_proposal("options must not be blank"));
        }
        if !seen.insert(option.as_str()) {
            return Err(Error::invalid_proposal(format!("duplicate option: {}", option)));
        }
    }
    Ok(())
}

/// A published proposal with its pinned snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub group: String,
    pub authorship: Authorship,
    pub title: String,
    pub voting_type: VotingType,
    pub options: Vec<String>,
    pub snapshots: Snapshots,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Pin a validated draft
    pub fn publish(draft: ProposalDraft, snapshots: Snapshots) -> Result<Self> {
        draft.validate()?;
        Ok(Self {
            id: draft.id,
            group: draft.group,
            authorship: draft.authorship,
            title: draft.title,
            voting_type: draft.voting_type,
            options: draft.options,
            snapshots,
            created_at: draft.created_at,
        })
    }

    pub fn period(&self, group: &Group, now: DateTime<Utc>) -> Period {
        Period::of(self.created_at, &group.duration, now)
    }

    /// A choice is valid when it selects at least one option and only
    /// options of this proposal
    pub fn ensure_valid_choice(&self, choice: &Choice) -> Result<()> {
        ensure_choice_among(&self.id, self.voting_type, &self.options, choice)
    }
}

/// Check that `choice` selects at least one option and only options in `options`
pub fn ensure_choice_among(
    poll: &str,
    voting_type: VotingType,
    options: &[String],
    choice: &Choice,
) -> Result<()> {
    let selected = choice.options(voting_type)?;
    if selected.is_empty() {
        return Err(Error::invalid_choice("no option selected"));
    }
    if let Some(unknown) = selected.iter().find(|option| !options.contains(*option)) {
        return Err(Error::invalid_choice(format!("{} is not an option of {}", unknown, poll)));
    }
    Ok(())
}

/// A vote as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub proposal: String,
    pub authorship: Authorship,
    pub choice: Choice,
    /// Power the voter claims; checked against a fresh computation
    pub power: Decimal,
}

impl Ballot {
    pub fn author(&self) -> &Did {
        &self.authorship.did
    }
}
