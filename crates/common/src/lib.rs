//! Common types, errors, configuration and logging for Voty

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{Configuration, EngineConfig};
pub use error::{Error, Result};
pub use types::{ChainRef, Did, Pin, Snapshot, Snapshots};
