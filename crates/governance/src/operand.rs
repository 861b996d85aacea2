//! Atomic ownership and membership predicates
//!
//! An [`Operand`] asks one question of one chain: does the identity hold at
//! least some amount of something there, or is it on a list. The
//! [`OperandEvaluator`] answers it with a single read against a pinned
//! snapshot. Reads for a whole permission set are gathered up front into a
//! [`HoldingTable`] so that the algebra itself never waits on the network.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use voty_common::{ChainRef, Did, Error, Pin, Result, Snapshot, Snapshots};
use voty_did::AddressResolver;

use crate::reader::ChainStateReader;

/// What an operand checks for
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criterion {
    /// The chain's native coin
    NativeBalance { minimum: Decimal },
    /// A fungible token contract
    TokenBalance { contract: String, minimum: Decimal },
    /// Number of tokens held from an NFT collection
    NftOwnership { contract: String, minimum: Decimal },
    /// Explicit membership by DID or address
    Allowlist { members: BTreeSet<String> },
}

impl Criterion {
    /// Smallest holding that satisfies the criterion
    pub fn minimum(&self) -> Decimal {
        match self {
            Criterion::NativeBalance { minimum }
            | Criterion::TokenBalance { minimum, .. }
            | Criterion::NftOwnership { minimum, .. } => *minimum,
            Criterion::Allowlist { .. } => Decimal::ONE,
        }
    }

    /// Whether the criterion can be decided without reading chain state
    pub fn is_local(&self) -> bool {
        matches!(self, Criterion::Allowlist { .. })
    }

    fn allows(&self, did: &Did, address: Option<&str>) -> bool {
        match self {
            Criterion::Allowlist { members } => {
                members.contains(did.as_str())
                    || address.map_or(false, |address| {
                        members.iter().any(|m| m.eq_ignore_ascii_case(address))
                    })
            }
            _ => false,
        }
    }
}

/// A leaf predicate evaluated against one chain
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Operand {
    pub chain: ChainRef,
    pub criterion: Criterion,
}

impl Operand {
    pub fn new(chain: ChainRef, criterion: Criterion) -> Self {
        Self { chain, criterion }
    }

    /// Boolean reading of a holding
    pub fn admits(&self, holding: Decimal) -> bool {
        holding >= self.criterion.minimum() && holding > Decimal::ZERO
    }

    /// Decimal reading of a holding: the holding itself if it qualifies, else zero
    pub fn weigh(&self, holding: Decimal) -> Decimal {
        if self.admits(holding) {
            holding
        } else {
            Decimal::ZERO
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.criterion {
            Criterion::NativeBalance { minimum } => {
                write!(f, "native >= {} on {}", minimum, self.chain)
            }
            Criterion::TokenBalance { contract, minimum } => {
                write!(f, "{} >= {} on {}", contract, minimum, self.chain)
            }
            Criterion::NftOwnership { contract, minimum } => {
                write!(f, "{} NFTs >= {} on {}", contract, minimum, self.chain)
            }
            Criterion::Allowlist { members } => {
                write!(f, "allowlist of {} on {}", members.len(), self.chain)
            }
        }
    }
}

/// Holdings read for a set of identities and operands at fixed pins
#[derive(Debug, Clone, Default)]
pub struct HoldingTable {
    holdings: HashMap<(Did, Operand, Pin), Decimal>,
}

impl HoldingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: Did, operand: Operand, pin: Pin, holding: Decimal) {
        self.holdings.insert((identity, operand, pin), holding);
    }

    /// The holding read for `identity` and `operand` at `pin`.
    ///
    /// Fails with `MissingReading` if it was never loaded; an identity that
    /// holds nothing has an explicit zero entry.
    pub fn get(&self, identity: &Did, operand: &Operand, pin: Pin) -> Result<Decimal> {
        self.holdings
            .get(&(identity.clone(), operand.clone(), pin))
            .copied()
            .ok_or_else(|| {
                Error::missing_reading(format!("{} for {} at {}", operand, identity, pin))
            })
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

/// Answers operands for identities against pinned chain state
#[derive(Clone)]
pub struct OperandEvaluator {
    reader: Arc<dyn ChainStateReader>,
    addresses: Arc<dyn AddressResolver>,
    concurrency: usize,
}

impl OperandEvaluator {
    /// Create an evaluator issuing at most `concurrency` reads at once when loading
    pub fn new(
        reader: Arc<dyn ChainStateReader>,
        addresses: Arc<dyn AddressResolver>,
        concurrency: usize,
    ) -> Self {
        Self {
            reader,
            addresses,
            concurrency: concurrency.max(1),
        }
    }

    /// Read the holding of `identity` for `operand` at `snapshot`.
    ///
    /// An identity with no address on the operand's chain, or one that does
    /// not meet the criterion, simply holds zero. Only a failed read is an error.
    pub async fn evaluate(&self, operand: &Operand, identity: &Did, snapshot: Snapshot) -> Result<Decimal> {
        if snapshot.chain != operand.chain {
            return Err(Error::MissingSnapshot(operand.chain));
        }

        let address = self
            .addresses
            .resolve_address(identity, operand.chain, snapshot.pin)
            .await?;

        if operand.criterion.is_local() {
            let member = operand.criterion.allows(identity, address.as_deref());
            return Ok(if member { Decimal::ONE } else { Decimal::ZERO });
        }

        let address = match address {
            Some(address) => address,
            None => {
                debug!("{} has no address on chain {}", identity, operand.chain);
                return Ok(Decimal::ZERO);
            }
        };

        let holding = self
            .reader
            .read(operand.chain, snapshot.pin, &address, &operand.criterion)
            .await?;
        debug!("{} holds {} for {} at {}", identity, holding, operand, snapshot.pin);
        Ok(holding)
    }

    /// Read every operand for every identity into a [`HoldingTable`].
    ///
    /// All chains must be pinned before any read is issued. Duplicate
    /// operands are read once, and at most `concurrency` reads are in flight.
    pub async fn load<'a, O>(
        &self,
        operands: O,
        identities: &[Did],
        snapshots: &Snapshots,
    ) -> Result<HoldingTable>
    where
        O: IntoIterator<Item = &'a Operand>,
    {
        let operands: BTreeSet<&Operand> = operands.into_iter().collect();
        snapshots.ensure_covers(operands.iter().map(|operand| &operand.chain))?;

        let identities: BTreeSet<&Did> = identities.iter().collect();
        let mut reads = Vec::with_capacity(operands.len() * identities.len());
        for identity in &identities {
            for operand in &operands {
                let snapshot = snapshots.get(operand.chain)?;
                reads.push((*identity, *operand, snapshot));
            }
        }

        let count = reads.len();
        let readings: Vec<_> = stream::iter(reads)
            .map(|(identity, operand, snapshot)| async move {
                let holding = self.evaluate(operand, identity, snapshot).await?;
                Ok::<_, Error>((identity.clone(), operand.clone(), snapshot.pin, holding))
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut table = HoldingTable::new();
        for (identity, operand, pin, holding) in readings {
            table.insert(identity, operand, pin, holding);
        }

        info!("Loaded {} holdings for {} identities", count, identities.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::StaticChainReader;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use voty_did::StaticAddressResolver;

    fn token(minimum: Decimal) -> Criterion {
        Criterion::TokenBalance {
            contract: "0xtoken".to_string(),
            minimum,
        }
    }

    fn setup() -> (Arc<StaticChainReader>, Arc<StaticAddressResolver>) {
        let reader = Arc::new(StaticChainReader::new());
        let resolver = Arc::new(StaticAddressResolver::new());
        resolver.bind("alice.eth", ChainRef::ETH, "0xa11ce");
        (reader, resolver)
    }

    #[test]
    fn test_admits_and_weigh() {
        let operand = Operand::new(ChainRef::ETH, token(dec!(10)));
        assert!(operand.admits(dec!(10)));
        assert!(!operand.admits(dec!(9.99)));
        assert_eq!(operand.weigh(dec!(12)), dec!(12));
        assert_eq!(operand.weigh(dec!(3)), Decimal::ZERO);

        // A zero minimum still requires holding something
        let any = Operand::new(ChainRef::ETH, token(Decimal::ZERO));
        assert!(!any.admits(Decimal::ZERO));
        assert!(any.admits(dec!(0.0001)));
    }

    #[tokio::test]
    async fn test_evaluate_reads_at_pin() {
        let (reader, resolver) = setup();
        let operand = Operand::new(ChainRef::ETH, token(dec!(10)));
        reader.set_holding(ChainRef::ETH, "0xa11ce", &operand.criterion, Pin::new(100), dec!(12));
        let evaluator = OperandEvaluator::new(reader.clone(), resolver, 5);
        let alice = Did::new("alice.eth");

        let before = Snapshot::new(ChainRef::ETH, Pin::new(99));
        let after = Snapshot::new(ChainRef::ETH, Pin::new(100));
        assert_eq!(evaluator.evaluate(&operand, &alice, before).await.unwrap(), Decimal::ZERO);
        assert_eq!(evaluator.evaluate(&operand, &alice, after).await.unwrap(), dec!(12));
        assert_eq!(reader.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_address_holds_nothing() {
        let (reader, resolver) = setup();
        let evaluator = OperandEvaluator::new(reader.clone(), resolver, 5);
        let operand = Operand::new(ChainRef::MATIC, token(dec!(1)));
        let snapshot = Snapshot::new(ChainRef::MATIC, Pin::new(1));

        let holding = evaluator.evaluate(&operand, &Did::new("alice.eth"), snapshot).await.unwrap();
        assert_eq!(holding, Decimal::ZERO);
        assert_eq!(reader.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_read_is_an_error() {
        let (reader, resolver) = setup();
        reader.fail_chain(ChainRef::ETH);
        let evaluator = OperandEvaluator::new(reader, resolver, 5);
        let operand = Operand::new(ChainRef::ETH, token(dec!(1)));
        let snapshot = Snapshot::new(ChainRef::ETH, Pin::new(1));

        let result = evaluator.evaluate(&operand, &Did::new("alice.eth"), snapshot).await;
        assert!(matches!(result, Err(Error::ChainRead { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_for_other_chain_rejected() {
        let (reader, resolver) = setup();
        let evaluator = OperandEvaluator::new(reader, resolver, 5);
        let operand = Operand::new(ChainRef::ETH, token(dec!(1)));
        let snapshot = Snapshot::new(ChainRef::CKB, Pin::new(1));

        let result = evaluator.evaluate(&operand, &Did::new("alice.eth"), snapshot).await;
        assert!(matches!(result, Err(Error::MissingSnapshot(c)) if c == ChainRef::ETH));
    }

    #[tokio::test]
    async fn test_allowlist_is_local() {
        let (reader, resolver) = setup();
        let evaluator = OperandEvaluator::new(reader.clone(), resolver, 5);
        let members = ["bob.bit".to_string(), "0xA11CE".to_string()].into_iter().collect();
        let operand = Operand::new(ChainRef::ETH, Criterion::Allowlist { members });
        let snapshot = Snapshot::new(ChainRef::ETH, Pin::new(1));

        let alice = evaluator.evaluate(&operand, &Did::new("alice.eth"), snapshot).await.unwrap();
        let bob = evaluator.evaluate(&operand, &Did::new("bob.bit"), snapshot).await.unwrap();
        let carol = evaluator.evaluate(&operand, &Did::new("carol.eth"), snapshot).await.unwrap();
        assert_eq!((alice, bob, carol), (Decimal::ONE, Decimal::ONE, Decimal::ZERO));
        assert_eq!(reader.calls(), 0);
    }

    #[tokio::test]
    async fn test_load_requires_every_chain_before_reading() {
        let (reader, resolver) = setup();
        let evaluator = OperandEvaluator::new(reader.clone(), resolver, 5);
        let operands = [
            Operand::new(ChainRef::ETH, token(dec!(1))),
            Operand::new(ChainRef::CKB, token(dec!(1))),
        ];
        let snapshots: Snapshots = [Snapshot::new(ChainRef::ETH, Pin::new(1))].into_iter().collect();

        let result = evaluator.load(&operands, &[Did::new("alice.eth")], &snapshots).await;
        assert!(matches!(result, Err(Error::MissingSnapshot(c)) if c == ChainRef::CKB));
        assert_eq!(reader.calls(), 0);
    }

    #[tokio::test]
    async fn test_load_deduplicates_and_bounds_reads() {
        let reader = Arc::new(StaticChainReader::new().with_latency(Duration::from_millis(5)));
        let resolver = Arc::new(StaticAddressResolver::new());
        let identities: Vec<Did> = (0..6).map(|i| Did::new(format!("voter{}.eth", i))).collect();
        for (i, did) in identities.iter().enumerate() {
            resolver.bind(did.clone(), ChainRef::ETH, format!("0x{:02}", i));
        }

        let evaluator = OperandEvaluator::new(reader.clone(), resolver, 2);
        let a = Operand::new(ChainRef::ETH, token(dec!(1)));
        let b = Operand::new(ChainRef::ETH, Criterion::NativeBalance { minimum: dec!(1) });
        let operands = [a.clone(), b.clone(), a.clone()];
        let snapshots: Snapshots = [Snapshot::new(ChainRef::ETH, Pin::new(7))].into_iter().collect();

        let table = evaluator.load(&operands, &identities, &snapshots).await.unwrap();
        assert_eq!(table.len(), 12);
        assert_eq!(reader.calls(), 12);
        assert!(reader.peak_in_flight() <= 2);
        assert_eq!(table.get(&identities[0], &a, Pin::new(7)).unwrap(), Decimal::ZERO);
        assert!(matches!(
            table.get(&identities[0], &a, Pin::new(8)),
            Err(Error::MissingReading(_))
        ));
    }

    #[test]
    fn test_criterion_serialization() {
        let criterion = token(dec!(10));
        let json = serde_json::to_string(&criterion).unwrap();
        assert_eq!(json, r#"{"type":"token_balance","contract":"0xtoken","minimum":"10"}"#);
        assert_eq!(serde_json::from_str::<Criterion>(&json).unwrap(), criterion);
    }
}
