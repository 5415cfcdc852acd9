// Blockchain module
//
// This module contains the property ledger core including:
// - Block structure and canonical hashing
// - Proof of work miner
// - Ledger (append-only chain)
// - Chain validation
// - Ownership views derived from the chain
// - Registry orchestrating register and transfer intents

pub mod block;
pub mod chain;
pub mod ownership;
pub mod pow;
pub mod registry;
pub mod validation;

// Re-export main components for easier access
pub use block::{Action, Block, Metadata, MetadataValue};
pub use chain::{AppendError, Ledger, LedgerSnapshot};
pub use pow::MiningError;
pub use registry::{PropertyDetails, Registry, RegistryError};
pub use validation::{validate_chain, ChainError};
