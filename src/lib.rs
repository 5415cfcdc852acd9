//! Tamper-evident property ownership ledger
//!
//! Ownership events are sealed into proof-of-work blocks on an append-only
//! chain. Who owns what is always derived by folding over that chain.

pub mod blockchain;
pub mod config;
pub mod intents;

pub use blockchain::{Action, Block, ChainError, Ledger, LedgerSnapshot, Metadata, PropertyDetails, Registry, RegistryError};
pub use config::RegistryConfig;
