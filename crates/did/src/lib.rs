//! Authorship verification for Voty documents
//!
//! Every proposal and vote carries an [`Authorship`] claim and a [`Proof`].
//! The [`AuthorshipVerifier`] picks the [`DidChecker`] registered for the
//! DID's suffix and confirms that the proof was signed by the address the
//! DID was bound to at the claimed snapshot.

pub mod authorship;
pub mod bit;
pub mod checker;
pub mod eth;
pub mod resolver;
pub mod verifier;

pub use authorship::{Authorship, Proof, ProofKind, HASH_PLACEHOLDER};
pub use bit::BitChecker;
pub use checker::DidChecker;
pub use eth::EthChecker;
pub use resolver::{AddressResolver, StaticAddressResolver};
pub use verifier::AuthorshipVerifier;
