use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block::{self, Action, Block, Metadata};
use super::chain::{AppendError, Ledger, LedgerSnapshot};
use super::ownership;
use super::pow::{self, MiningError};
use super::validation::ChainError;
use crate::config::RegistryConfig;

/// Errors that can occur during registry operations
///
/// The ledger is left untouched whenever one of these is returned.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Property {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Property {0} is not registered")]
    NotRegistered(String),

    #[error("Property {property_id} is owned by {expected}, not {claimed}")]
    OwnershipMismatch {
        property_id: String,
        expected: String,
        claimed: String,
    },

    #[error("Metadata value for {0} is not a finite number")]
    NonFiniteMetadata(String),

    #[error("Mining error: {0}")]
    Mining(#[from] MiningError),

    #[error("Append error: {0}")]
    Append(#[from] AppendError),
}

/// Descriptive fields recorded when a property is registered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDetails {
    pub location: String,

    /// Floor area in square feet
    pub area: f64,

    pub survey_number: String,
}

impl From<PropertyDetails> for Metadata {
    fn from(details: PropertyDetails) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("location".to_string(), details.location.into());
        metadata.insert("area".to_string(), details.area.into());
        metadata.insert("survey_number".to_string(), details.survey_number.into());
        metadata
    }
}

/// What a caller asked for, checked against the projection before mining
enum Intent<'a> {
    Register {
        property_id: &'a str,
        owner: &'a str,
    },
    Transfer {
        property_id: &'a str,
        claimed_owner: &'a str,
        new_owner: &'a str,
    },
}

impl Intent<'_> {
    fn action(&self) -> Action {
        match self {
            Intent::Register { .. } => Action::Register,
            Intent::Transfer { .. } => Action::Transfer,
        }
    }

    fn property_id(&self) -> &str {
        match self {
            Intent::Register { property_id, .. } | Intent::Transfer { property_id, .. } => property_id,
        }
    }

    fn recorded_owner(&self) -> &str {
        match self {
            Intent::Register { owner, .. } => owner,
            Intent::Transfer { new_owner, .. } => new_owner,
        }
    }

    /// Checks the intent against the current state of the ledger
    fn admit(&self, ledger: &Ledger) -> Result<(), RegistryError> {
        match *self {
            Intent::Register { property_id, .. } => {
                if ledger.is_registered(property_id) {
                    return Err(RegistryError::AlreadyRegistered(property_id.to_string()));
                }
            }
            Intent::Transfer {
                property_id,
                claimed_owner,
                ..
            } => match ledger.current_owner(property_id) {
                None => return Err(RegistryError::NotRegistered(property_id.to_string())),
                Some(current) if current != claimed_owner => {
                    return Err(RegistryError::OwnershipMismatch {
                        property_id: property_id.to_string(),
                        expected: current.to_string(),
                        claimed: claimed_owner.to_string(),
                    });
                }
                Some(_) => {}
            },
        }
        Ok(())
    }
}

/// Property registry over a shared ledger
///
/// Register and transfer intents are serialised through a single writer
/// gate. Mining runs outside the ledger lock on a private candidate; only
/// the final append takes the write lock. Queries take the read lock.
#[derive(Debug, Clone)]
pub struct Registry {
    /// The ledger every view is derived from
    ledger: Arc<RwLock<Ledger>>,

    /// Held for the whole check, mine and append of one intent
    writer: Arc<tokio::sync::Mutex<()>>,

    /// Upper bound on mining one block
    mining_timeout: Option<Duration>,

    /// Blocks appended straight to the ledger after the next mining run,
    /// so tests can move the tail under an in-flight intent
    #[cfg(test)]
    interleaved: Arc<parking_lot::Mutex<Vec<(Action, String, String)>>>,
}

impl Registry {
    /// Creates a registry with a fresh ledger
    ///
    /// Genesis is mined on the calling thread with no bound; use `create`
    /// from async code or when a mining timeout is configured.
    ///
    /// # Arguments
    ///
    /// * `config` - Difficulty and mining bound for this registry
    pub fn new(config: &RegistryConfig) -> Self {
        Registry::from_ledger(Ledger::new(config.difficulty), config)
    }

    /// Creates a registry, mining genesis as a bounded blocking task
    ///
    /// # Returns
    ///
    /// The registry, or `Mining(TimedOut)` if genesis could not be sealed
    /// within `config.mining_timeout`
    pub async fn create(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let genesis =
            pow::mine_with_timeout(Block::genesis_candidate(), config.difficulty, config.mining_timeout).await?;
        Ok(Registry::from_ledger(Ledger::with_genesis(genesis, config.difficulty), config))
    }

    fn from_ledger(ledger: Ledger, config: &RegistryConfig) -> Self {
        Registry {
            ledger: Arc::new(RwLock::new(ledger)),
            writer: Arc::new(tokio::sync::Mutex::new(())),
            mining_timeout: config.mining_timeout,
            #[cfg(test)]
            interleaved: Arc::default(),
        }
    }

    /// Creates a registry with the given difficulty and no mining bound
    pub fn with_difficulty(difficulty: u32) -> Self {
        Registry::new(&RegistryConfig {
            difficulty,
            ..RegistryConfig::default()
        })
    }

    /// Registers a new property
    ///
    /// # Arguments
    ///
    /// * `property_id` - The property key
    /// * `owner` - The first owner
    /// * `metadata` - Details stored with the REGISTER block
    ///
    /// # Returns
    ///
    /// The sealed REGISTER block, `AlreadyRegistered`, or
    /// `NonFiniteMetadata` for a NaN or infinite float
    pub async fn register_property(
        &self,
        property_id: &str,
        owner: &str,
        metadata: Metadata,
    ) -> Result<Block, RegistryError> {
        self.commit(Intent::Register { property_id, owner }, metadata).await
    }

    /// Registers a new property with the standard details
    pub async fn register_with_details(
        &self,
        property_id: &str,
        owner: &str,
        details: PropertyDetails,
    ) -> Result<Block, RegistryError> {
        self.register_property(property_id, owner, details.into()).await
    }

    /// Transfers a property to a new owner
    ///
    /// # Arguments
    ///
    /// * `property_id` - The property key
    /// * `claimed_owner` - Who the caller says owns it now
    /// * `new_owner` - Who will own it afterwards
    /// * `note` - Free text stored with the TRANSFER block, skipped if empty
    ///
    /// # Returns
    ///
    /// The sealed TRANSFER block, or `NotRegistered` / `OwnershipMismatch`
    pub async fn transfer_property(
        &self,
        property_id: &str,
        claimed_owner: &str,
        new_owner: &str,
        note: &str,
    ) -> Result<Block, RegistryError> {
        let mut metadata = Metadata::new();
        metadata.insert("from".to_string(), claimed_owner.into());
        if !note.is_empty() {
            metadata.insert("note".to_string(), note.into());
        }

        let intent = Intent::Transfer {
            property_id,
            claimed_owner,
            new_owner,
        };
        self.commit(intent, metadata).await
    }

    /// Check, mine and append one intent as a single unit
    async fn commit(&self, intent: Intent<'_>, metadata: Metadata) -> Result<Block, RegistryError> {
        // JSON has no NaN or infinity; they would all hash as `null`.
        if let Some(key) = block::non_finite_key(&metadata) {
            warn!("Rejected {} of {}: non-finite value for {}", intent.action(), intent.property_id(), key);
            return Err(RegistryError::NonFiniteMetadata(key.to_string()));
        }

        let _writer = self.writer.lock().await;

        loop {
            let (candidate, difficulty) = {
                let ledger = self.ledger.read();
                if let Err(err) = intent.admit(&ledger) {
                    warn!("Rejected {} of {}: {}", intent.action(), intent.property_id(), err);
                    return Err(err);
                }
                let candidate = ledger.next_candidate(
                    intent.action(),
                    intent.property_id(),
                    intent.recorded_owner(),
                    metadata.clone(),
                );
                (candidate, ledger.difficulty())
            };

            let sealed = pow::mine_with_timeout(candidate, difficulty, self.mining_timeout).await?;

            #[cfg(test)]
            self.append_interleaved();

            let appended = {
                let mut ledger = self.ledger.write();
                ledger.try_append(sealed).map(Block::clone)
            };

            match appended {
                Ok(block) => {
                    info!(
                        "{} {} -> {} sealed as block {}",
                        block.action, block.property_id, block.owner, block.index
                    );
                    return Ok(block);
                }
                Err(AppendError::StaleTip { expected, actual }) => {
                    debug!("Tail moved from {} to {} while mining, re-mining", expected, actual);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    #[cfg(test)]
    fn append_interleaved(&self) {
        let pending: Vec<_> = self.interleaved.lock().drain(..).collect();
        let mut ledger = self.ledger.write();
        for (action, property_id, owner) in pending {
            ledger.append(action, &property_id, &owner, Metadata::new());
        }
    }

    /// Gets the current owner of a property
    pub fn current_owner(&self, property_id: &str) -> Option<String> {
        self.ledger.read().current_owner(property_id).map(str::to_string)
    }

    /// Every block referencing a property, in ledger order
    pub fn history(&self, property_id: &str) -> Vec<Block> {
        self.ledger.read().history(property_id).cloned().collect()
    }

    /// Whether the property has an owner
    pub fn is_registered(&self, property_id: &str) -> bool {
        self.ledger.read().is_registered(property_id)
    }

    /// Current owner of every registered property
    pub fn owners(&self) -> BTreeMap<String, String> {
        ownership::owners(self.ledger.read().blocks())
    }

    /// Validates the whole ledger
    pub fn validate(&self) -> Result<(), ChainError> {
        self.ledger.read().validate()
    }

    /// Boolean form of `validate`
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Takes a copy of the ledger for export
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.read().snapshot()
    }

    /// Proof of work difficulty of the ledger
    pub fn difficulty(&self) -> u32 {
        self.ledger.read().difficulty()
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.ledger.read().len()
    }

    /// Never true; the ledger always holds genesis
    pub fn is_empty(&self) -> bool {
        self.ledger.read().is_empty()
    }
}
