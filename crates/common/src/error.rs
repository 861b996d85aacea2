//! Error types shared by every Voty component

use thiserror::Error;

use crate::types::ChainRef;

/// Common result type used throughout Voty
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for permission evaluation, authorship verification
/// and vote tallying.
///
/// None of these are recovered from internally. Defaulting an ownership or
/// eligibility check to a permissive value would be a security hazard, so
/// every error is surfaced to the immediate caller as-is.
#[derive(Error, Debug)]
pub enum Error {
    /// Evaluation requested before the chain was pinned
    #[error("Missing snapshot for chain {0}")]
    MissingSnapshot(ChainRef),

    /// Upstream chain could not provide a pin
    #[error("Snapshot unavailable for chain {chain}: {reason}")]
    SnapshotUnavailable { chain: ChainRef, reason: String },

    /// An operand read against a pinned chain could not be completed
    #[error("Chain read failed on chain {chain}: {reason}")]
    ChainRead { chain: ChainRef, reason: String },

    /// Evaluation over holdings that were never loaded for an operand
    #[error("Missing reading: {0}")]
    MissingReading(String),

    /// No checker recognizes the DID suffix
    #[error("Unsupported DID: {0}")]
    UnsupportedDid(String),

    /// Signature or ownership check failed
    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    /// Decimal arithmetic exceeded the supported precision
    #[error("Precision overflow: {0}")]
    PrecisionOverflow(String),

    /// Malformed permission set
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    /// Malformed or inapplicable choice
    #[error("Invalid choice: {0}")]
    InvalidChoice(String),

    /// Vote rejected by the vote pipeline
    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    /// Proposal rejected by the proposal pipeline
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    /// A vote already exists for this (proposal, author) pair
    #[error("Duplicate vote by {author} on proposal {proposal}")]
    DuplicateVote { proposal: String, author: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new snapshot unavailable error
    pub fn snapshot_unavailable<S: Into<String>>(chain: ChainRef, reason: S) -> Self {
        Error::SnapshotUnavailable {
            chain,
            reason: reason.into(),
        }
    }

    /// Create a new chain read error
    pub fn chain_read<S: Into<String>>(chain: ChainRef, reason: S) -> Self {
        Error::ChainRead {
            chain,
            reason: reason.into(),
        }
    }

    /// Create a new missing reading error
    pub fn missing_reading<S: Into<String>>(msg: S) -> Self {
        Error::MissingReading(msg.into())
    }

    /// Create a new unsupported DID error
    pub fn unsupported_did<S: Into<String>>(did: S) -> Self {
        Error::UnsupportedDid(did.into())
    }

    /// Create a new invalid proof error
    pub fn invalid_proof<S: Into<String>>(msg: S) -> Self {
        Error::InvalidProof(msg.into())
    }

    /// Create a new precision overflow error
    pub fn precision_overflow<S: Into<String>>(msg: S) -> Self {
        Error::PrecisionOverflow(msg.into())
    }

    /// Create a new invalid permission error
    pub fn invalid_permission<S: Into<String>>(msg: S) -> Self {
        Error::InvalidPermission(msg.into())
    }

    /// Create a new invalid choice error
    pub fn invalid_choice<S: Into<String>>(msg: S) -> Self {
        Error::InvalidChoice(msg.into())
    }

    /// Create a new invalid vote error
    pub fn invalid_vote<S: Into<String>>(msg: S) -> Self {
        Error::InvalidVote(msg.into())
    }

    /// Create a new invalid proposal error
    pub fn invalid_proposal<S: Into<String>>(msg: S) -> Self {
        Error::InvalidProposal(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Whether the caller may retry the failed operation with backoff.
    ///
    /// Only upstream chain failures qualify; everything else is either a
    /// caller bug or a permanent rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SnapshotUnavailable { .. } | Error::ChainRead { .. }
        )
    }
}
