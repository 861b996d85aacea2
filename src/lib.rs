//! Voty
//!
//! Community governance over multiple chains: who may propose, how much
//! each vote weighs, whether a document was signed by the identity it
//! claims, and how votes add up.

pub mod engine;

pub use engine::GovernanceEngine;

/// Module version information
pub mod version {
    /// The current version of the Voty library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Re-export the component crates
pub use voty_common as common;
pub use voty_crypto as crypto;
pub use voty_did as did;
pub use voty_governance as governance;
