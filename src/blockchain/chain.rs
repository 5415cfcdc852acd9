use log::info;
use serde::Serialize;
use thiserror::Error;

use super::block::{Action, Block, Metadata};
use super::ownership;
use super::pow;
use super::validation::{self, ChainError};

/// Errors that can occur when appending a sealed block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("Stale block: built on {expected}, current tail is {actual}")]
    StaleTip { expected: String, actual: String },

    #[error("Invalid block: {0}")]
    InvalidBlock(String),
}

/// Read-only export of the ledger
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    /// Proof of work difficulty every block satisfies
    pub difficulty: u32,

    /// Number of blocks, genesis included
    pub length: usize,

    /// Every block in ledger order
    pub chain: Vec<Block>,
}

impl LedgerSnapshot {
    /// Renders the snapshot as indented JSON
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Append-only sequence of sealed blocks
///
/// Always holds at least the genesis block. Blocks are never reordered or
/// removed.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The chain of blocks
    chain: Vec<Block>,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: u32,
}

impl Ledger {
    /// Creates a new ledger holding a freshly mined genesis block
    ///
    /// # Arguments
    ///
    /// * `difficulty` - The proof of work difficulty for every block
    pub fn new(difficulty: u32) -> Self {
        Ledger::with_genesis(pow::mine(Block::genesis_candidate(), difficulty), difficulty)
    }

    /// Creates a ledger around a genesis block mined elsewhere
    ///
    /// The block must come from sealing `Block::genesis_candidate` at the
    /// same difficulty; `validate` reports it otherwise.
    pub fn with_genesis(genesis: Block, difficulty: u32) -> Self {
        info!("Created genesis block {} at difficulty {}", genesis.hash, difficulty);

        Ledger {
            chain: vec![genesis],
            difficulty,
        }
    }

    /// Proof of work difficulty every block is mined at
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Never true once constructed
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Gets the last block in the chain
    pub fn tail(&self) -> &Block {
        // The constructor pushes genesis and nothing ever removes blocks.
        &self.chain[self.chain.len() - 1]
    }

    /// Gets the block at `index`, if any
    pub fn get(&self, index: usize) -> Option<&Block> {
        self.chain.get(index)
    }

    /// Every block in ledger order
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Builds an unsealed candidate on top of the current tail
    pub fn next_candidate(
        &self,
        action: Action,
        property_id: &str,
        owner: &str,
        metadata: Metadata,
    ) -> Block {
        Block::candidate(
            self.chain.len() as u64,
            action,
            property_id,
            owner,
            metadata,
            self.tail().hash.clone(),
        )
    }

    /// Mines a new block with the given content and appends it
    ///
    /// Never fails: domain checks belong to the caller and happen before
    /// this call.
    ///
    /// # Returns
    ///
    /// The newly sealed block
    pub fn append(&mut self, action: Action, property_id: &str, owner: &str, metadata: Metadata) -> &Block {
        let candidate = self.next_candidate(action, property_id, owner, metadata);
        let sealed = pow::mine(candidate, self.difficulty);
        self.push(sealed)
    }

    /// Appends a block that was mined elsewhere
    ///
    /// The block must have been built on the current tail, carry the next
    /// index, and satisfy this ledger's proof of work. A block built on an
    /// older tail is rejected with `StaleTip` and has to be re-mined.
    pub fn try_append(&mut self, block: Block) -> Result<&Block, AppendError> {
        let tail = self.tail();
        if block.previous_hash != tail.hash || block.index != self.chain.len() as u64 {
            return Err(AppendError::StaleTip {
                expected: block.previous_hash,
                actual: tail.hash.clone(),
            });
        }
        if !block.has_consistent_hash() {
            return Err(AppendError::InvalidBlock(format!(
                "hash of block {} does not match its contents",
                block.index
            )));
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(AppendError::InvalidBlock(format!(
                "block {} does not meet difficulty {}",
                block.index, self.difficulty
            )));
        }

        Ok(self.push(block))
    }

    fn push(&mut self, block: Block) -> &Block {
        info!(
            "Appended block {} ({} {} -> {}, nonce={}, hash={})",
            block.index, block.action, block.property_id, block.owner, block.nonce, block.hash
        );
        self.chain.push(block);
        self.tail()
    }

    /// Validates the whole ledger
    pub fn validate(&self) -> Result<(), ChainError> {
        validation::validate_chain(&self.chain, self.difficulty)
    }

    /// Boolean form of `validate`
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Latest owner of a property, `None` if never registered
    pub fn current_owner(&self, property_id: &str) -> Option<&str> {
        ownership::current_owner(&self.chain, property_id)
    }

    /// Every block referencing a property, in ledger order
    pub fn history<'a>(&'a self, property_id: &'a str) -> impl Iterator<Item = &'a Block> + Clone + 'a {
        ownership::history(&self.chain, property_id)
    }

    /// Whether the property has an owner
    pub fn is_registered(&self, property_id: &str) -> bool {
        ownership::is_registered(&self.chain, property_id)
    }

    /// Takes a copy of the ledger for export
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            difficulty: self.difficulty,
            length: self.chain.len(),
            chain: self.chain.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.chain
    }

    #[cfg(test)]
    pub(crate) fn set_difficulty_for_test(&mut self, difficulty: u32) {
        self.difficulty = difficulty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::{zero_hash, SYSTEM_OWNER};

    #[test]
    fn test_new_ledger() {
        let ledger = Ledger::new(2);

        assert_eq!(ledger.len(), 1);
        let genesis = ledger.tail();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.action, Action::Genesis);
        assert_eq!(genesis.owner, SYSTEM_OWNER);
        assert_eq!(genesis.previous_hash, zero_hash());
        assert!(genesis.hash.starts_with("00"));
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_with_genesis() {
        let genesis = pow::mine(Block::genesis_candidate(), 1);
        let ledger = Ledger::with_genesis(genesis.clone(), 1);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.tail(), &genesis);
        assert_eq!(ledger.get(0), Some(&genesis));
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_append_links_to_tail() {
        let mut ledger = Ledger::new(1);
        ledger.append(Action::Register, "P1", "Alice", Metadata::new());
        ledger.append(Action::Transfer, "P1", "Bob", Metadata::new());

        let blocks = ledger.blocks();
        assert_eq!(blocks.len(), 3);
        for i in 1..blocks.len() {
            assert_eq!(blocks[i].index, i as u64);
            assert_eq!(blocks[i].previous_hash, blocks[i - 1].hash);
            assert!(blocks[i].hash.starts_with('0'));
            assert_eq!(blocks[i].hash, blocks[i].calculate_hash());
        }
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_try_append_rejects_stale_block() {
        let mut ledger = Ledger::new(1);
        let stale = pow::mine(
            ledger.next_candidate(Action::Register, "P1", "Alice", Metadata::new()),
            1,
        );
        ledger.append(Action::Register, "P2", "Bob", Metadata::new());

        let err = ledger.try_append(stale).unwrap_err();
        assert!(matches!(err, AppendError::StaleTip { .. }));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_try_append_rejects_unmined_block() {
        let mut ledger = Ledger::new(1);
        let candidate = ledger.next_candidate(Action::Register, "P1", "Alice", Metadata::new());

        let err = ledger.try_append(candidate).unwrap_err();
        assert!(matches!(err, AppendError::InvalidBlock(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_try_append_accepts_fresh_block() {
        let mut ledger = Ledger::new(1);
        let sealed = pow::mine(
            ledger.next_candidate(Action::Register, "P1", "Alice", Metadata::new()),
            1,
        );

        let appended = ledger.try_append(sealed).unwrap().clone();
        assert_eq!(appended.index, 1);
        assert_eq!(ledger.current_owner("P1"), Some("Alice"));
    }

    #[test]
    fn test_tampering_after_append_is_detected() {
        let mut ledger = Ledger::new(1);
        ledger.append(Action::Register, "P1", "Alice", Metadata::new());
        ledger.append(Action::Register, "P2", "Bob", Metadata::new());

        ledger.blocks_mut()[1].owner = "Mallory".to_string();

        assert_eq!(ledger.validate(), Err(ChainError::HashMismatch { index: 1 }));
    }

    #[test]
    fn test_snapshot() {
        let mut ledger = Ledger::new(1);
        ledger.append(Action::Register, "P1", "Alice", Metadata::new());

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.difficulty, 1);
        assert_eq!(snapshot.length, 2);
        assert_eq!(snapshot.chain.len(), 2);

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["length"], 2);
        assert_eq!(json["chain"][1]["action"], "REGISTER");
        assert_eq!(json["chain"][1]["owner"], "Alice");
    }
}
