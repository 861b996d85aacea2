//! Grants
//!
//! A grant is a funding round of a community. It declares the same
//! [`Permission`] as a group, but runs in three phases: after a pending
//! period, holders of the proposing set add proposals, which then become
//! the options of a single-choice vote weighted by the voting set. Once
//! voting has ended, winning proposals are selected for funding.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use voty_common::{ChainRef, Did, Error, Result, Snapshots};
use voty_did::Authorship;

use crate::algebra::PermissionSet;
use crate::choice::{Choice, VotingType};
use crate::proposal::{ensure_choice_among, Period, Permission};

/// Length of the pending, adding-option and voting phases, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDuration {
    pub pending: u64,
    pub adding_option: u64,
    pub voting: u64,
}

impl GrantDuration {
    pub fn new(pending: u64, adding_option: u64, voting: u64) -> Self {
        Self {
            pending,
            adding_option,
            voting,
        }
    }
}

/// A grant as submitted by a community, before its snapshots are pinned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDraft {
    pub id: String,
    pub community: String,
    pub name: String,
    pub permission: Permission,
    pub duration: GrantDuration,
    /// What a selected proposal receives
    pub funding: String,
    pub created_at: DateTime<Utc>,
}

impl GrantDraft {
    /// Check names, every phase against `min_period_secs` and the voting set's factors
    pub fn validate(&self, min_period_secs: u64) -> Result<()> {
        if self.id.is_empty() || self.community.is_empty() || self.name.trim().is_empty() {
            return Err(Error::invalid_permission("grant must name its id, community and name"));
        }
        let phases = [
            ("pending", self.duration.pending),
            ("adding option", self.duration.adding_option),
            ("voting", self.duration.voting),
        ];
        for (name, secs) in phases {
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

/// A published grant with the snapshots its permission is evaluated at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: String,
    pub community: String,
    pub name: String,
    pub permission: Permission,
    pub duration: GrantDuration,
    pub funding: String,
    pub snapshots: Snapshots,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// Pin a draft. Callers validate the draft first.
    pub fn publish(draft: GrantDraft, snapshots: Snapshots) -> Self {
        Self {
            id: draft.id,
            community: draft.community,
            name: draft.name,
            permission: draft.permission,
            duration: draft.duration,
            funding: draft.funding,
            snapshots,
            created_at: draft.created_at,
        }
    }

    pub fn period(&self, now: DateTime<Utc>) -> Period {
        Period::of_grant(self.created_at, &self.duration, now)
    }
}

/// A proposal competing for a grant; its id is the option voters pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantProposal {
    pub id: String,
    pub grant: String,
    pub authorship: Authorship,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl GrantProposal {
    pub fn author(&self) -> &Did {
        &self.authorship.did
    }
}

/// A grant together with the proposals added to it and the ones selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRound {
    grant: Grant,
    proposals: Vec<GrantProposal>,
    /// Selected proposal id -> selector
    selected: BTreeMap<String, Did>,
}

impl GrantRound {
    pub fn new(grant: Grant) -> Self {
        Self {
            grant,
            proposals: Vec::new(),
            selected: BTreeMap::new(),
        }
    }

    pub fn grant(&self) -> &Grant {
        &self.grant
    }

    pub fn proposals(&self) -> &[GrantProposal] {
        &self.proposals
    }

    pub fn period(&self, now: DateTime<Utc>) -> Period {
        self.grant.period(now)
    }

    /// Grant votes pick exactly one proposal
    pub fn voting_type(&self) -> VotingType {
        VotingType::Single
    }

    /// The options of the grant vote, in the order proposals were added
    pub fn options(&self) -> Vec<String> {
        self.proposals.iter().map(|proposal| proposal.id.clone()).collect()
    }

    /// Add a proposal as an option. Each author may add one proposal.
    ///
    /// Phase and permission checks happen before this, where the chain
    /// state is available.
    pub fn add_proposal(&mut self, proposal: GrantProposal) -> Result<()> {
        if proposal.grant != self.grant.id {
            return Err(Error::invalid_proposal(format!(
                "proposal {} belongs to {}, not {}",
                proposal.id, proposal.grant, self.grant.id
            )));
        }
        if proposal.title.trim().is_empty() {
            return Err(Error::invalid_proposal("title is required"));
        }
        if proposal.id.trim().is_empty() {
            return Err(Error::invalid_proposal("proposal id is required"));
        }
        if self.proposals.iter().any(|existing| existing.id == proposal.id) {
            return Err(Error::invalid_proposal(format!("duplicate proposal: {}", proposal.id)));
        }
        if let Some(existing) = self.proposals.iter().find(|existing| existing.author() == proposal.author()) {
            return Err(Error::invalid_proposal(format!(
                "{} already proposed {} in {}",
                proposal.author(),
                existing.id,
                self.grant.id
            )));
        }

        info!("Added proposal {} to grant {}", proposal.id, self.grant.id);
        self.proposals.push(proposal);
        Ok(())
    }

    /// A vote must pick one of the added proposals
    pub fn ensure_valid_choice(&self, choice: &Choice) -> Result<()> {
        ensure_choice_among(&self.grant.id, self.voting_type(), &self.options(), choice)
    }

    /// Mark `proposal` as selected by `selector`.
    ///
    /// Only possible once voting has ended, and only once per proposal.
    pub fn select(&mut self, proposal: &str, selector: &Did, now: DateTime<Utc>) -> Result<()> {
        let period = self.period(now);
        if period != Period::Ended {
            return Err(Error::invalid_proposal(format!(
                "grant {} cannot select proposals yet ({:?})",
                self.grant.id, period
            )));
        }
        if !self.proposals.iter().any(|existing| existing.id == proposal) {
            return Err(Error::invalid_proposal(format!(
                "{} is not a proposal of {}",
                proposal, self.grant.id
            )));
        }
        if let Some(by) = self.selected.get(proposal) {
            return Err(Error::invalid_proposal(format!("{} was already selected by {}", proposal, by)));
        }

        self.selected.insert(proposal.to_string(), selector.clone());
        info!("{} selected {} in grant {}", selector, proposal, self.grant.id);
        Ok(())
    }

    /// Who selected `proposal`, if anyone
    pub fn selected_by(&self, proposal: &str) -> Option<&Did> {
        self.selected.get(proposal)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }
}
