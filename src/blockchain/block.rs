use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Actor recorded as the owner of the genesis block
pub const SYSTEM_OWNER: &str = "SYSTEM";

/// Property id carried by the genesis block
pub const GENESIS_PROPERTY_ID: &str = "0";

/// The kind of event a block records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Genesis,
    Register,
    Transfer,
}

impl Action {
    /// Whether this action sets the owner of a property
    pub fn assigns_owner(self) -> bool {
        matches!(self, Action::Register | Action::Transfer)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Genesis => "GENESIS",
            Action::Register => "REGISTER",
            Action::Transfer => "TRANSFER",
        };
        f.write_str(name)
    }
}

/// A scalar metadata value. The ledger never interprets these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// False for NaN and infinite floats, which JSON renders as `null`
    pub fn is_finite(&self) -> bool {
        match self {
            MetadataValue::Float(value) => value.is_finite(),
            _ => true,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Free-form block metadata. Kept ordered so hashing never depends on
/// insertion order.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Represents one sealed event in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position of the block in the ledger (0 = genesis)
    pub index: u64,

    /// Time the candidate block was built
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub action: Action,

    /// Key of the property this block refers to
    pub property_id: String,

    /// Initial owner for REGISTER, new owner for TRANSFER
    pub owner: String,

    /// Caller-defined details (location, area, note, ...)
    pub metadata: Metadata,

    /// Hash of the preceding block
    pub previous_hash: String,

    /// Proof of work solution
    pub nonce: u64,

    /// Hash over every other field, empty until sealed
    #[serde(default)]
    pub hash: String,
}

impl Block {
    /// Creates an unsealed candidate block
    ///
    /// The nonce starts at 0 and the hash is left empty; run the miner to
    /// seal it.
    pub fn candidate(
        index: u64,
        action: Action,
        property_id: impl Into<String>,
        owner: impl Into<String>,
        metadata: Metadata,
        previous_hash: impl Into<String>,
    ) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            action,
            property_id: property_id.into(),
            owner: owner.into(),
            metadata,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Creates the unsealed genesis candidate
    pub fn genesis_candidate() -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("note".to_string(), "Genesis Block".into());

        Block::candidate(
            0,
            Action::Genesis,
            GENESIS_PROPERTY_ID,
            SYSTEM_OWNER,
            metadata,
            zero_hash(),
        )
    }

    /// Calculates the canonical hash of the block
    ///
    /// Every field except `hash` goes into a JSON object. serde_json keeps
    /// object keys sorted (the `preserve_order` feature must stay off), so
    /// the bytes are identical however the block was put together.
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a lowercase hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let block_data = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "action": self.action,
            "property_id": self.property_id,
            "owner": self.owner,
            "metadata": self.metadata,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });

        let mut hasher = Sha256::new();
        hasher.update(block_data.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether the stored hash matches the block contents
    pub fn has_consistent_hash(&self) -> bool {
        !self.hash.is_empty() && self.hash == self.calculate_hash()
    }

    /// Whether the stored hash meets the given difficulty
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    /// Whether the miner has filled in the hash
    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// First metadata key holding a value that cannot be hashed faithfully
pub fn non_finite_key(metadata: &Metadata) -> Option<&str> {
    metadata
        .iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(key, _)| key.as_str())
}

/// The previous-hash sentinel used by the genesis block
pub fn zero_hash() -> String {
    "0".repeat(HASH_HEX_LEN)
}

/// Checks that `hash` starts with `difficulty` hex zeros
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("location".to_string(), "12 Harbour Rd".into());
        metadata.insert("area".to_string(), 1200_i64.into());
        metadata
    }

    #[test]
    fn test_calculate_hash() {
        let block = Block::candidate(1, Action::Register, "P1", "Alice", sample_metadata(), zero_hash());

        let hash = block.calculate_hash();
        assert_eq!(hash.len(), HASH_HEX_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash, block.calculate_hash());
    }

    #[test]
    fn test_hash_ignores_metadata_insertion_order() {
        let block = Block::candidate(1, Action::Register, "P1", "Alice", sample_metadata(), zero_hash());

        let mut reordered = Metadata::new();
        reordered.insert("area".to_string(), 1200_i64.into());
        reordered.insert("location".to_string(), "12 Harbour Rd".into());
        let other = Block {
            metadata: reordered,
            ..block.clone()
        };

        assert_eq!(block.calculate_hash(), other.calculate_hash());
    }

    #[test]
    fn test_hash_excludes_hash_field() {
        let block = Block::candidate(3, Action::Transfer, "P1", "Bob", Metadata::new(), zero_hash());
        let with_hash = Block {
            hash: "deadbeef".to_string(),
            ..block.clone()
        };

        assert_eq!(block.calculate_hash(), with_hash.calculate_hash());
    }

    #[test]
    fn test_every_content_field_changes_hash() {
        let base = Block::candidate(1, Action::Register, "P1", "Alice", sample_metadata(), zero_hash());
        let original = base.calculate_hash();

        let mut changed = base.clone();
        changed.owner = "Mallory".to_string();
        assert_ne!(original, changed.calculate_hash());

        let mut changed = base.clone();
        changed.nonce += 1;
        assert_ne!(original, changed.calculate_hash());

        let mut changed = base.clone();
        changed.metadata.insert("note".to_string(), "edited".into());
        assert_ne!(original, changed.calculate_hash());

        let mut changed = base;
        changed.action = Action::Transfer;
        assert_ne!(original, changed.calculate_hash());
    }

    #[test]
    fn test_genesis_candidate() {
        let genesis = Block::genesis_candidate();

        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.action, Action::Genesis);
        assert_eq!(genesis.owner, SYSTEM_OWNER);
        assert_eq!(genesis.previous_hash, zero_hash());
        assert!(!genesis.is_sealed());
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn test_non_finite_key() {
        let mut metadata = sample_metadata();
        assert_eq!(non_finite_key(&metadata), None);

        metadata.insert("area".to_string(), f64::NAN.into());
        assert_eq!(non_finite_key(&metadata), Some("area"));

        metadata.insert("area".to_string(), f64::INFINITY.into());
        assert_eq!(non_finite_key(&metadata), Some("area"));
        assert!(MetadataValue::Float(-1.5).is_finite());
    }

    #[test]
    fn test_action_serializes_upper_case() {
        let json = serde_json::to_string(&Action::Transfer).unwrap();
        assert_eq!(json, "\"TRANSFER\"");
        assert_eq!(Action::Register.to_string(), "REGISTER");
    }
}
