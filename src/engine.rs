//! The proposal, grant and vote pipelines
//!
//! [`GovernanceEngine`] wires the snapshot resolver, operand evaluator,
//! authorship verifier and tally store together. Every computation for a
//! round runs against the snapshots pinned when the round opened, so the
//! eligibility check, the power calculation and the authorship proof all
//! agree on the same chain state.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use voty_common::{ChainRef, Configuration, Did, EngineConfig, Error, Result, Snapshots};
use voty_crypto::DocumentHash;
use voty_did::{AddressResolver, Authorship, AuthorshipVerifier, Proof};
use voty_governance::{
    ensure_choice_among, evaluate_boolean, evaluate_decimal, Ballot, BooleanSet, ChainStateReader,
    DecimalSet, Grant, GrantDraft, GrantProposal, GrantRound, Group, OperandEvaluator, Period,
    PermissionSet, Proposal, ProposalDraft, SnapshotCache, SnapshotResolver, Tally, TallyIncrements,
    TallyStore, VoteTally, VotingType,
};

/// What a ballot is cast on: a group proposal or a grant
struct Poll<'a> {
    id: &'a str,
    voting_type: VotingType,
    options: &'a [String],
    voting: &'a DecimalSet,
    snapshots: &'a Snapshots,
    period: Period,
}

/// Entry point for evaluating permissions and accepting proposals and votes
pub struct GovernanceEngine {
    config: EngineConfig,
    reader: Arc<dyn ChainStateReader>,
    snapshots: SnapshotResolver,
    operands: OperandEvaluator,
    verifier: AuthorshipVerifier,
    store: Arc<dyn TallyStore>,
}

impl GovernanceEngine {
    /// Create an engine verifying `.eth` and `.bit` identities
    pub fn new(
        config: EngineConfig,
        reader: Arc<dyn ChainStateReader>,
        addresses: Arc<dyn AddressResolver>,
        store: Arc<dyn TallyStore>,
    ) -> Result<Self> {
        config.validate()?;

        let snapshots = SnapshotResolver::new(reader.clone(), config.snapshot_concurrency);
        let operands = OperandEvaluator::new(reader.clone(), addresses.clone(), config.operand_concurrency);
        let verifier = AuthorshipVerifier::with_default_checkers(addresses);

        Ok(Self {
            config,
            reader,
            snapshots,
            operands,
            verifier,
            store,
        })
    }

    /// Replace the authorship verifier, e.g. to register more checkers
    pub fn with_verifier(mut self, verifier: AuthorshipVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn verifier(&self) -> &AuthorshipVerifier {
        &self.verifier
    }

    /// Chains a proposal by `author` in `group` must pin: the chain backing
    /// the author's DID plus every chain either permission set reads
    pub fn required_chains_for_proposal(&self, group: &Group, author: &Did) -> Result<BTreeSet<ChainRef>> {
        let mut chains = group.permission_chains();
        chains.insert(self.verifier.required_coin_type(author)?);
        Ok(chains)
    }

    /// Pin every chain a proposal by `author` needs, as of `at`
    pub async fn open_round(
        &self,
        cache: &SnapshotCache,
        group: &Group,
        author: &Did,
        at: DateTime<Utc>,
    ) -> Result<Snapshots> {
        let chains = self.required_chains_for_proposal(group, author)?;
        self.snapshots.resolve(cache, chains, at).await
    }

    /// Whether `identity` satisfies the group's proposing set at `snapshots`
    pub async fn can_propose(&self, group: &Group, identity: &Did, snapshots: &Snapshots) -> Result<bool> {
        self.satisfies(&group.permission.proposing, identity, snapshots).await
    }

    /// Voting power of `identity` under the group's voting set at `snapshots`
    pub async fn voting_power(&self, group: &Group, identity: &Did, snapshots: &Snapshots) -> Result<Decimal> {
        self.power_under(&group.permission.voting, identity, snapshots).await
    }

    async fn satisfies(&self, set: &BooleanSet, identity: &Did, snapshots: &Snapshots) -> Result<bool> {
        let holdings = self
            .operands
            .load(set.operands(), std::slice::from_ref(identity), snapshots)
            .await?;
        evaluate_boolean(set, identity, snapshots, &holdings)
    }

    async fn power_under(&self, set: &DecimalSet, identity: &Did, snapshots: &Snapshots) -> Result<Decimal> {
        let holdings = self
            .operands
            .load(set.operands(), std::slice::from_ref(identity), snapshots)
            .await?;
        evaluate_decimal(set, identity, snapshots, &holdings)
    }

    /// Verify and publish a proposal.
    ///
    /// The round's snapshots are resolved through `cache` at the draft's
    /// creation time and pinned on the returned proposal. The author's claimed
    /// snapshot must match the pin of its chain.
    pub async fn submit_proposal(
        &self,
        cache: &SnapshotCache,
        group: &Group,
        draft: ProposalDraft,
        proof: &Proof,
        hash: &DocumentHash,
    ) -> Result<Proposal> {
        if draft.group != group.id {
            return Err(Error::invalid_proposal(format!(
                "proposal {} belongs to {}, not {}",
                draft.id, draft.group, group.id
            )));
        }
        group.validate(self.config.min_period_secs)?;
        draft.validate()?;

        let author = draft.authorship.did.clone();
        let snapshots = self.open_round(cache, group, &author, draft.created_at).await?;

        if let Ok(pinned) = snapshots.get(draft.authorship.coin_type) {
            if pinned.pin != draft.authorship.snapshot {
                return Err(Error::invalid_proposal(format!(
                    "authorship snapshot {} does not match pinned {} on chain {}",
                    draft.authorship.snapshot, pinned.pin, pinned.chain
                )));
            }
        }

        self.verifier.verify(&draft.authorship, proof, hash).await?;

        if !self.can_propose(group, &author, &snapshots).await? {
            warn!("{} may not propose in group {}", author, group.id);
            return Err(Error::invalid_proposal(format!("{} may not propose in {}", author, group.id)));
        }

        let proposal = Proposal::publish(draft, snapshots)?;
        info!(
            "Published proposal {} by {} with {} snapshots",
            proposal.id,
            author,
            proposal.snapshots.len()
        );
        Ok(proposal)
    }

    /// Verify a vote and apply it to the proposal's tally.
    ///
    /// Returns the increments that were applied. Nothing is recorded unless
    /// every check passes, and a second vote by the same author fails with
    /// `DuplicateVote`.
    pub async fn submit_vote(
        &self,
        group: &Group,
        proposal: &Proposal,
        ballot: &Ballot,
        proof: &Proof,
        hash: &DocumentHash,
        now: DateTime<Utc>,
    ) -> Result<TallyIncrements> {
        if proposal.group != group.id {
            return Err(Error::invalid_vote(format!(
                "proposal {} does not belong to group {}",
                proposal.id, group.id
            )));
        }

        let poll = Poll {
            id: &proposal.id,
            voting_type: proposal.voting_type,
            options: &proposal.options,
            voting: &group.permission.voting,
            snapshots: &proposal.snapshots,
            period: proposal.period(group, now),
        };
        self.cast(poll, ballot, proof, hash, now).await
    }

    /// Pin the chains a grant's permission reads, as of its creation
    pub async fn open_grant(&self, cache: &SnapshotCache, draft: GrantDraft) -> Result<Grant> {
        draft.validate(self.config.min_period_secs)?;

        let snapshots = self
            .snapshots
            .resolve(cache, draft.permission_chains(), draft.created_at)
            .await?;
        let grant = Grant::publish(draft, snapshots);
        info!("Opened grant {} with {} snapshots", grant.id, grant.snapshots.len());
        Ok(grant)
    }

    /// Whether `identity` may add proposals to `grant`
    pub async fn can_propose_in_grant(&self, grant: &Grant, identity: &Did) -> Result<bool> {
        self.satisfies(&grant.permission.proposing, identity, &grant.snapshots).await
    }

    /// Voting power of `identity` in `grant`
    pub async fn grant_voting_power(&self, grant: &Grant, identity: &Did) -> Result<Decimal> {
        self.power_under(&grant.permission.voting, identity, &grant.snapshots).await
    }

    /// Verify a grant proposal and add it as an option of the grant vote.
    ///
    /// Proposals are only accepted while the grant is adding options, from
    /// authors satisfying the grant's proposing set.
    pub async fn submit_grant_proposal(
        &self,
        round: &mut GrantRound,
        proposal: GrantProposal,
        proof: &Proof,
        hash: &DocumentHash,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let grant = round.grant();
        if proposal.grant != grant.id {
            return Err(Error::invalid_proposal(format!(
                "proposal {} belongs to {}, not {}",
                proposal.id, proposal.grant, grant.id
            )));
        }

        let period = grant.period(now);
        if period != Period::AddingOption {
            return Err(Error::invalid_proposal(format!(
                "grant {} is not accepting proposals ({:?})",
                grant.id, period
            )));
        }

        if let Some(reason) = self
            .authorship_snapshot_mismatch(&grant.snapshots, &proposal.authorship, now)
            .await?
        {
            return Err(Error::invalid_proposal(reason));
        }
        self.verifier.verify(&proposal.authorship, proof, hash).await?;

        let author = proposal.author();
        if !self.can_propose_in_grant(grant, author).await? {
            warn!("{} may not propose in grant {}", author, grant.id);
            return Err(Error::invalid_proposal(format!("{} may not propose in {}", author, grant.id)));
        }

        round.add_proposal(proposal)
    }

    /// Verify a vote for one of a grant's proposals and apply it to the
    /// grant's tally
    pub async fn submit_grant_vote(
        &self,
        round: &GrantRound,
        ballot: &Ballot,
        proof: &Proof,
        hash: &DocumentHash,
        now: DateTime<Utc>,
    ) -> Result<TallyIncrements> {
        let grant = round.grant();
        let options = round.options();
        let poll = Poll {
            id: &grant.id,
            voting_type: round.voting_type(),
            options: &options,
            voting: &grant.permission.voting,
            snapshots: &grant.snapshots,
            period: grant.period(now),
        };
        self.cast(poll, ballot, proof, hash, now).await
    }

    /// Select a grant proposal for funding once voting has ended.
    ///
    /// The selector proves authorship like any author and must satisfy the
    /// grant's proposing set.
    pub async fn select_grant_proposal(
        &self,
        round: &mut GrantRound,
        proposal: &str,
        authorship: &Authorship,
        proof: &Proof,
        hash: &DocumentHash,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let grant = round.grant();
        if let Some(reason) = self
            .authorship_snapshot_mismatch(&grant.snapshots, authorship, now)
            .await?
        {
            return Err(Error::invalid_proposal(reason));
        }
        self.verifier.verify(authorship, proof, hash).await?;

        if !self.can_propose_in_grant(grant, &authorship.did).await? {
            return Err(Error::invalid_proposal(format!(
                "{} may not select proposals in {}",
                authorship.did, grant.id
            )));
        }

        round.select(proposal, &authorship.did, now)
    }

    async fn cast(
        &self,
        poll: Poll<'_>,
        ballot: &Ballot,
        proof: &Proof,
        hash: &DocumentHash,
        now: DateTime<Utc>,
    ) -> Result<TallyIncrements> {
        if ballot.proposal != poll.id {
            return Err(Error::invalid_vote(format!(
                "vote for {} does not match {}",
                ballot.proposal, poll.id
            )));
        }

        if let Some(reason) = self
            .authorship_snapshot_mismatch(poll.snapshots, &ballot.authorship, now)
            .await?
        {
            return Err(Error::invalid_vote(reason));
        }
        self.verifier.verify(&ballot.authorship, proof, hash).await?;

        if poll.period != Period::Voting {
            return Err(Error::invalid_vote(format!(
                "{} is not open for voting ({:?})",
                poll.id, poll.period
            )));
        }

        ensure_choice_among(poll.id, poll.voting_type, poll.options, &ballot.choice)?;

        let author = ballot.author();
        let power = self.power_under(poll.voting, author, poll.snapshots).await?;
        if power != ballot.power {
            return Err(Error::invalid_vote(format!(
                "{} claims power {} but holds {}",
                author, ballot.power, power
            )));
        }

        let increments = VoteTally::accept(poll.id, author, &ballot.choice, poll.voting_type, power)?;
        self.store.record_vote(&increments).await?;

        info!("Accepted vote by {} on {} with power {}", author, poll.id, power);
        Ok(increments)
    }

    /// An authorship pin must equal the round's pin for that chain, or, if
    /// the round does not pin the chain, not lie in the future. Returns the
    /// reason when it does not.
    async fn authorship_snapshot_mismatch(
        &self,
        pinned: &Snapshots,
        authorship: &Authorship,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let chain = authorship.coin_type;
        let claimed = authorship.snapshot;

        match pinned.get(chain) {
            Ok(snapshot) if snapshot.pin == claimed => Ok(None),
            Ok(snapshot) => Ok(Some(format!(
                "snapshot {} on chain {} does not match pin {}",
                claimed, chain, snapshot.pin
            ))),
            Err(_) => {
                let latest = self
                    .reader
                    .latest_pin(chain, now)
                    .await
                    .map_err(|e| Error::snapshot_unavailable(chain, e.to_string()))?;
                debug!("Chain {} not pinned, latest is {}", chain, latest);
                if claimed > latest {
                    return Ok(Some(format!(
                        "snapshot {} on chain {} is ahead of latest {}",
                        claimed, chain, latest
                    )));
                }
                Ok(None)
            }
        }
    }

    /// Current totals of a proposal or grant
    pub async fn tally(&self, poll: &str) -> Result<Tally> {
        self.store.tally(poll).await
    }
}
