//! Permission sets: eligibility and voting power expressions over operands
//!
//! A [`BooleanSet`] decides whether an identity may act, a [`DecimalSet`]
//! decides how much its vote weighs. Both are plain trees evaluated
//! synchronously against a [`HoldingTable`] loaded by the
//! [`OperandEvaluator`](crate::OperandEvaluator); all chain reads happen
//! before evaluation starts.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use voty_common::{ChainRef, Did, Error, Result, Snapshots};

use crate::operand::{HoldingTable, Operand};

/// Eligibility expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum BooleanSet {
    /// True when every child is true; true when empty
    And(Vec<BooleanSet>),
    /// True when any child is true; false when empty
    Or(Vec<BooleanSet>),
    Not(Box<BooleanSet>),
    Operand(Operand),
}

/// Voting power expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum DecimalSet {
    /// Sum of the children; zero when empty
    Sum(Vec<DecimalSet>),
    /// Largest child; zero when empty
    Max(Vec<DecimalSet>),
    /// Smallest child; zero when empty
    Min(Vec<DecimalSet>),
    /// A child multiplied by a fixed non-negative factor
    Scale { factor: Decimal, set: Box<DecimalSet> },
    Operand(Operand),
}

/// Operations shared by both kinds of set
pub trait PermissionSet {
    /// Call `visit` for every operand in the tree, depth first
    fn visit_operands<'a>(&'a self, visit: &mut dyn FnMut(&'a Operand));

    /// Unique operands referenced by the set
    fn operands(&self) -> BTreeSet<&Operand> {
        let mut operands = BTreeSet::new();
        self.visit_operands(&mut |operand| {
            operands.insert(operand);
        });
        operands
    }

    /// Unique chains that must be pinned before the set can be evaluated
    fn required_chains(&self) -> BTreeSet<ChainRef> {
        let mut chains = BTreeSet::new();
        self.visit_operands(&mut |operand| {
            chains.insert(operand.chain);
        });
        chains
    }
}

impl PermissionSet for BooleanSet {
    fn visit_operands<'a>(&'a self, visit: &mut dyn FnMut(&'a Operand)) {
        match self {
            BooleanSet::And(children) | BooleanSet::Or(children) => {
                for child in children {
                    child.visit_operands(visit);
                }
            }
            BooleanSet::Not(child) => child.visit_operands(visit),
            BooleanSet::Operand(operand) => visit(operand),
        }
    }
}

impl PermissionSet for DecimalSet {
    fn visit_operands<'a>(&'a self, visit: &mut dyn FnMut(&'a Operand)) {
        match self {
            DecimalSet::Sum(children) | DecimalSet::Max(children) | DecimalSet::Min(children) => {
                for child in children {
                    child.visit_operands(visit);
                }
            }
            DecimalSet::Scale { set, .. } => set.visit_operands(visit),
            DecimalSet::Operand(operand) => visit(operand),
        }
    }
}

impl DecimalSet {
    /// Reject scale factors below zero
    pub fn validate(&self) -> Result<()> {
        match self {
            DecimalSet::Sum(children) | DecimalSet::Max(children) | DecimalSet::Min(children) => {
                children.iter().try_for_each(DecimalSet::validate)
            }
            DecimalSet::Scale { factor, set } => {
                if factor.is_sign_negative() && !factor.is_zero() {
                    return Err(Error::invalid_permission(format!(
                        "scale factor must not be negative: {}",
                        factor
                    )));
                }
                set.validate()
            }
            DecimalSet::Operand(_) => Ok(()),
        }
    }
}

/// Decide whether `identity` satisfies `set` at the pinned `snapshots`.
///
/// Fails with `MissingSnapshot` before evaluating anything if a chain the
/// set needs is not pinned.
pub fn evaluate_boolean(
    set: &BooleanSet,
    identity: &Did,
    snapshots: &Snapshots,
    holdings: &HoldingTable,
) -> Result<bool> {
    snapshots.ensure_covers(&set.required_chains())?;
    boolean(set, identity, snapshots, holdings)
}

fn boolean(set: &BooleanSet, identity: &Did, snapshots: &Snapshots, holdings: &HoldingTable) -> Result<bool> {
    match set {
        BooleanSet::And(children) => {
            for child in children {
                if !boolean(child, identity, snapshots, holdings)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        BooleanSet::Or(children) => {
            for child in children {
                if boolean(child, identity, snapshots, holdings)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        BooleanSet::Not(child) => Ok(!boolean(child, identity, snapshots, holdings)?),
        BooleanSet::Operand(operand) => {
            let snapshot = snapshots.get(operand.chain)?;
            let holding = holdings.get(identity, operand, snapshot.pin)?;
            Ok(operand.admits(holding))
        }
    }
}

/// Compute the voting power of `identity` under `set` at the pinned `snapshots`.
///
/// The result is never negative. Arithmetic is exact; a result that does
/// not fit the decimal range fails with `PrecisionOverflow`.
pub fn evaluate_decimal(
    set: &DecimalSet,
    identity: &Did,
    snapshots: &Snapshots,
    holdings: &HoldingTable,
) -> Result<Decimal> {
    snapshots.ensure_covers(&set.required_chains())?;
    set.validate()?;
    decimal(set, identity, snapshots, holdings)
}

fn decimal(set: &DecimalSet, identity: &Did, snapshots: &Snapshots, holdings: &HoldingTable) -> Result<Decimal> {
    match set {
        DecimalSet::Sum(children) => children.iter().try_fold(Decimal::ZERO, |total, child| {
            let value = decimal(child, identity, snapshots, holdings)?;
            total
                .checked_add(value)
                .ok_or_else(|| Error::precision_overflow(format!("{} + {}", total, value)))
        }),
        DecimalSet::Max(children) => extremum(children, identity, snapshots, holdings, Decimal::max),
        DecimalSet::Min(children) => extremum(children, identity, snapshots, holdings, Decimal::min),
        DecimalSet::Scale { factor, set } => {
            let value = decimal(set, identity, snapshots, holdings)?;
            value
                .checked_mul(*factor)
                .ok_or_else(|| Error::precision_overflow(format!("{} * {}", value, factor)))
        }
        DecimalSet::Operand(operand) => {
            let snapshot = snapshots.get(operand.chain)?;
            let holding = holdings.get(identity, operand, snapshot.pin)?;
            Ok(operand.weigh(holding))
        }
    }
}

fn extremum(
    children: &[DecimalSet],
    identity: &Did,
    snapshots: &Snapshots,
    holdings: &HoldingTable,
    pick: fn(Decimal, Decimal) -> Decimal,
) -> Result<Decimal> {
    let mut result: Option<Decimal> = None;
    for child in children {
        let value = decimal(child, identity, snapshots, holdings)?;
        result = Some(result.map_or(value, |current| pick(current, value)));
    }
    Ok(result.unwrap_or(Decimal::ZERO))
}
