//! Shared fixture: a group on two chains with two members
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal_macros::dec;

use voty::common::{ChainRef, EngineConfig, Pin};
use voty::crypto::{sha256, DocumentHash, PersonalSigner};
use voty::did::{Proof, StaticAddressResolver};
use voty::governance::{
    BooleanSet, Criterion, DecimalSet, Duration, Group, MemoryTallyStore, Operand, Permission,
    StaticChainReader,
};
use voty::GovernanceEngine;

pub const TEMPLATE: &str = "Signing a document on Voty\n\nsha256: {sha256}";
pub const ETH_HEAD: Pin = Pin::new(17_000_000);
pub const MATIC_HEAD: Pin = Pin::new(50_000_000);
pub const CKB_HEAD: Pin = Pin::new(9_000_000);

pub fn governance_token() -> Criterion {
    Criterion::TokenBalance {
        contract: "0xgov".to_string(),
        minimum: dec!(10),
    }
}

pub fn bridged_token() -> Criterion {
    Criterion::TokenBalance {
        contract: "0xbridged".to_string(),
        minimum: dec!(5),
    }
}

pub fn signer(byte: u8) -> PersonalSigner {
    let mut secret = [0u8; 32];
    secret[31] = byte;
    PersonalSigner::from_bytes(&secret).expect("valid test key")
}

pub fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// A moment inside the voting period of a proposal created at [`created_at`]
pub fn voting_time() -> DateTime<Utc> {
    created_at() + ChronoDuration::seconds(3_600 + 10)
}

pub struct Fixture {
    pub reader: Arc<StaticChainReader>,
    pub resolver: Arc<StaticAddressResolver>,
    pub store: Arc<MemoryTallyStore>,
    pub engine: GovernanceEngine,
    pub group: Group,
    pub alice: PersonalSigner,
    pub bob: PersonalSigner,
}

impl Fixture {
    /// alice.eth holds 12 governance tokens on Ethereum and none bridged.
    /// bob.bit holds 3 governance tokens (below the minimum) and 8 bridged.
    pub fn new() -> Self {
        let reader = Arc::new(StaticChainReader::new());
        let resolver = Arc::new(StaticAddressResolver::new());
        let store = Arc::new(MemoryTallyStore::new());
        let alice = signer(1);
        let bob = signer(2);

        reader.set_latest(ChainRef::ETH, ETH_HEAD);
        reader.set_latest(ChainRef::MATIC, MATIC_HEAD);
        reader.set_latest(ChainRef::CKB, CKB_HEAD);

        let alice_address = alice.address().to_string();
        let bob_address = bob.address().to_string();
        for chain in [ChainRef::ETH, ChainRef::MATIC] {
            resolver.bind("alice.eth", chain, alice_address.clone());
            resolver.bind("bob.bit", chain, bob_address.clone());
        }
        resolver.bind("bob.bit", ChainRef::CKB, bob_address.clone());

        let genesis = Pin::new(0);
        reader.set_holding(ChainRef::ETH, &alice_address, &governance_token(), genesis, dec!(12));
        reader.set_holding(ChainRef::ETH, &bob_address, &governance_token(), genesis, dec!(3));
        reader.set_holding(ChainRef::MATIC, &bob_address, &bridged_token(), genesis, dec!(8));

        let group = Group {
            id: "treasury".to_string(),
            community: "voty.bit".to_string(),
            permission: Permission {
                proposing: BooleanSet::Operand(Operand::new(ChainRef::ETH, governance_token())),
                voting: DecimalSet::Sum(vec![
                    DecimalSet::Operand(Operand::new(ChainRef::ETH, governance_token())),
                    DecimalSet::Operand(Operand::new(ChainRef::MATIC, bridged_token())),
                ]),
            },
            duration: Duration::new(3_600, 86_400),
        };

        let engine = GovernanceEngine::new(
            EngineConfig::default(),
            reader.clone(),
            resolver.clone(),
            store.clone(),
        )
        .expect("default config is valid");

        Self {
            reader,
            resolver,
            store,
            engine,
            group,
            alice,
            bob,
        }
    }
}

/// Hash `body` and sign it as `signer`
pub fn signed(signer: &PersonalSigner, body: &str) -> (DocumentHash, Proof) {
    let hash = sha256(body.as_bytes());
    let proof = Proof::personal_sign(signer, TEMPLATE, &hash).expect("signing succeeds");
    (hash, proof)
}
