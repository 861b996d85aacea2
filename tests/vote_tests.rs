mod common;

use std::error::Error as StdError;

use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use voty::common::{ChainRef, Did, Error, Pin};
use voty::did::Authorship;
use voty::governance::{Ballot, Choice, Proposal, ProposalDraft, SnapshotCache, TallyStore, VotingType};

use common::{created_at, signed, voting_time, Fixture, CKB_HEAD, ETH_HEAD, MATIC_HEAD};

async fn publish(fixture: &Fixture, voting_type: VotingType, options: &[&str]) -> Proposal {
    let cache = SnapshotCache::new();
    let draft = ProposalDraft {
        id: "p1".to_string(),
        group: fixture.group.id.clone(),
        authorship: Authorship::new("alice.eth", ChainRef::ETH, ETH_HEAD),
        title: "Pick the next integrations".to_string(),
        voting_type,
        options: options.iter().map(|o| o.to_string()).collect(),
        created_at: created_at(),
    };
    let (hash, proof) = signed(&fixture.alice, &draft.title);
    fixture
        .engine
        .submit_proposal(&cache, &fixture.group, draft, &proof, &hash)
        .await
        .expect("alice may propose")
}

fn ballot(author: &str, coin_type: ChainRef, pin: Pin, choice: Choice, power: Decimal) -> Ballot {
    Ballot {
        proposal: "p1".to_string(),
        authorship: Authorship::new(author, coin_type, pin),
        choice,
        power,
    }
}

#[tokio::test]
async fn test_votes_are_tallied() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;

    let (hash, proof) = signed(&fixture.alice, "alice votes yes");
    let alice = ballot("alice.eth", ChainRef::ETH, ETH_HEAD, Choice::single("Yes"), dec!(12));
    let applied = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &alice, &proof, &hash, voting_time())
        .await?;
    assert_eq!(applied.increments["Yes"], dec!(12));

    // bob.bit signs at a CKB height the proposal did not pin
    let (hash, proof) = signed(&fixture.bob, "bob votes no");
    let bob = ballot("bob.bit", ChainRef::CKB, CKB_HEAD, Choice::single("No"), dec!(8));
    fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &bob, &proof, &hash, voting_time())
        .await?;

    let tally = fixture.engine.tally("p1").await?;
    assert_eq!(tally.power_of("Yes"), dec!(12));
    assert_eq!(tally.power_of("No"), dec!(8));
    assert_eq!(tally.total, dec!(20));
    assert_eq!(tally.votes, 2);

    let voters = [Did::new("alice.eth"), Did::new("bob.bit"), Did::new("carol.eth")];
    let powers = fixture.store.powers_of("p1", &voters).await?;
    assert_eq!(powers.len(), 2);
    assert_eq!(powers[&Did::new("bob.bit")], dec!(8));

    let share = tally.projected_share(VotingType::Single, &Choice::empty(), Decimal::ZERO, "Yes")?;
    assert_eq!(share, dec!(0.6));
    Ok(())
}

#[tokio::test]
async fn test_multiple_choice_split() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Multiple, &["Indexer", "Bridge", "Wallet"]).await;

    let (hash, proof) = signed(&fixture.alice, "alice picks three");
    let choice = Choice::multiple(["Wallet", "Indexer", "Bridge"])?;
    let alice = ballot("alice.eth", ChainRef::ETH, ETH_HEAD, choice, dec!(12));
    let applied = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &alice, &proof, &hash, voting_time())
        .await?;

    assert_eq!(applied.increments.len(), 3);
    assert!(applied.increments.values().all(|power| *power == dec!(4)));
    assert_eq!(applied.increments.values().copied().sum::<Decimal>(), dec!(12));
    Ok(())
}

#[tokio::test]
async fn test_second_vote_rejected() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;

    let (hash, proof) = signed(&fixture.alice, "alice votes yes");
    let first = ballot("alice.eth", ChainRef::ETH, ETH_HEAD, Choice::single("Yes"), dec!(12));
    fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &first, &proof, &hash, voting_time())
        .await?;

    let (hash, proof) = signed(&fixture.alice, "alice switches to no");
    let second = ballot("alice.eth", ChainRef::ETH, ETH_HEAD, Choice::single("No"), dec!(12));
    let result = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &second, &proof, &hash, voting_time())
        .await;
    assert!(matches!(result, Err(Error::DuplicateVote { .. })));

    let tally = fixture.engine.tally("p1").await?;
    assert_eq!(tally.power_of("No"), Decimal::ZERO);
    assert_eq!(tally.votes, 1);
    Ok(())
}

#[tokio::test]
async fn test_inflated_power_rejected() {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;

    let (hash, proof) = signed(&fixture.bob, "bob votes no");
    let bob = ballot("bob.bit", ChainRef::CKB, CKB_HEAD, Choice::single("No"), dec!(11));
    let result = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &bob, &proof, &hash, voting_time())
        .await;
    assert!(matches!(result, Err(Error::InvalidVote(_))));
    assert_eq!(fixture.engine.tally("p1").await.unwrap().votes, 0);
}

#[tokio::test]
async fn test_power_uses_pinned_state() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;

    // bob acquires more bridged tokens after the proposal pinned MATIC
    let bob_address = fixture.bob.address().to_string();
    let later = Pin::new(MATIC_HEAD.height() + 1);
    fixture
        .reader
        .set_holding(ChainRef::MATIC, &bob_address, &common::bridged_token(), later, dec!(1000));
    fixture.reader.set_latest(ChainRef::MATIC, later);

    let (hash, proof) = signed(&fixture.bob, "bob votes no");
    let greedy = ballot("bob.bit", ChainRef::CKB, CKB_HEAD, Choice::single("No"), dec!(1000));
    let result = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &greedy, &proof, &hash, voting_time())
        .await;
    assert!(matches!(result, Err(Error::InvalidVote(_))));

    let honest = ballot("bob.bit", ChainRef::CKB, CKB_HEAD, Choice::single("No"), dec!(8));
    fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &honest, &proof, &hash, voting_time())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_vote_outside_voting_period_rejected() {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;
    let (hash, proof) = signed(&fixture.alice, "alice votes yes");
    let alice = ballot("alice.eth", ChainRef::ETH, ETH_HEAD, Choice::single("Yes"), dec!(12));

    let pending = created_at() + ChronoDuration::seconds(10);
    let ended = created_at() + ChronoDuration::days(2);
    for now in [pending, ended] {
        let result = fixture
            .engine
            .submit_vote(&fixture.group, &proposal, &alice, &proof, &hash, now)
            .await;
        assert!(matches!(result, Err(Error::InvalidVote(_))));
    }
}

#[tokio::test]
async fn test_vote_snapshot_checks() {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;

    // ETH is pinned by the proposal, so the vote must use exactly that pin
    let (hash, proof) = signed(&fixture.alice, "alice votes yes");
    let stale = ballot("alice.eth", ChainRef::ETH, Pin::new(1), Choice::single("Yes"), dec!(12));
    let result = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &stale, &proof, &hash, voting_time())
        .await;
    assert!(matches!(result, Err(Error::InvalidVote(_))));

    // CKB is not pinned, so the height only has to be at or below the chain head
    let (hash, proof) = signed(&fixture.bob, "bob votes no");
    let future = ballot(
        "bob.bit",
        ChainRef::CKB,
        Pin::new(CKB_HEAD.height() + 1),
        Choice::single("No"),
        dec!(8),
    );
    let result = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &future, &proof, &hash, voting_time())
        .await;
    assert!(matches!(result, Err(Error::InvalidVote(_))));
}

#[tokio::test]
async fn test_chain_confusion_rejected() {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;

    // Signature is valid and MATIC is pinned, but .eth names live on Ethereum
    let (hash, proof) = signed(&fixture.alice, "alice votes yes");
    let confused = ballot("alice.eth", ChainRef::MATIC, MATIC_HEAD, Choice::single("Yes"), dec!(12));
    let result = fixture
        .engine
        .submit_vote(&fixture.group, &proposal, &confused, &proof, &hash, voting_time())
        .await;
    assert!(matches!(result, Err(Error::InvalidProof(_))));
}

#[tokio::test]
async fn test_invalid_choice_rejected() {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;
    let (hash, proof) = signed(&fixture.alice, "alice votes maybe");

    for choice in [Choice::single("Maybe"), Choice::empty()] {
        let vote = ballot("alice.eth", ChainRef::ETH, ETH_HEAD, choice, dec!(12));
        let result = fixture
            .engine
            .submit_vote(&fixture.group, &proposal, &vote, &proof, &hash, voting_time())
            .await;
        assert!(matches!(result, Err(Error::InvalidChoice(_))));
    }
}

#[tokio::test]
async fn test_concurrent_votes_on_different_options() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::new();
    let proposal = publish(&fixture, VotingType::Single, &["Yes", "No"]).await;

    let (alice_hash, alice_proof) = signed(&fixture.alice, "alice votes yes");
    let (bob_hash, bob_proof) = signed(&fixture.bob, "bob votes no");
    let alice = ballot("alice.eth", ChainRef::ETH, ETH_HEAD, Choice::single("Yes"), dec!(12));
    let bob = ballot("bob.bit", ChainRef::CKB, CKB_HEAD, Choice::single("No"), dec!(8));

    let (first, second) = tokio::join!(
        fixture
            .engine
            .submit_vote(&fixture.group, &proposal, &alice, &alice_proof, &alice_hash, voting_time()),
        fixture
            .engine
            .submit_vote(&fixture.group, &proposal, &bob, &bob_proof, &bob_hash, voting_time()),
    );
    first?;
    second?;

    let tally = fixture.engine.tally("p1").await?;
    assert_eq!(tally.power_of("Yes"), dec!(12));
    assert_eq!(tally.power_of("No"), dec!(8));
    assert_eq!(tally.votes, 2);
    Ok(())
}
