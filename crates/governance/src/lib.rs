//! Permission and voting power evaluation for Voty
//!
//! Groups and grants declare who may propose (a [`BooleanSet`]) and how
//! much each vote weighs (a [`DecimalSet`]). Evaluating either takes three
//! steps:
//!
//! 1. ask the set for its [`required_chains`](PermissionSet::required_chains)
//! 2. pin those chains with the [`SnapshotResolver`]
//! 3. load holdings with the [`OperandEvaluator`] and evaluate the set
//!
//! Accepted votes are split across options by the [`choice`] codec and
//! folded into a [`Tally`] through a [`TallyStore`].

pub mod algebra;
pub mod choice;
pub mod grant;
pub mod operand;
pub mod proposal;
pub mod reader;
pub mod snapshot;
pub mod store;
pub mod tally;

pub use algebra::{evaluate_boolean, evaluate_decimal, BooleanSet, DecimalSet, PermissionSet};
pub use choice::{
    check_choice, choice_is_empty, power_of_choice, power_of_weighted_choice, update_choice, Choice,
    VotingType,
};
pub use grant::{Grant, GrantDraft, GrantDuration, GrantProposal, GrantRound};
pub use operand::{Criterion, HoldingTable, Operand, OperandEvaluator};
pub use proposal::{
    ensure_choice_among, Ballot, Duration, Group, Period, Permission, Proposal, ProposalDraft,
};
pub use reader::{ChainStateReader, StaticChainReader};
pub use snapshot::{SnapshotCache, SnapshotResolver};
pub use store::{MemoryTallyStore, TallyStore};
pub use tally::{Tally, TallyIncrements, VoteTally};
