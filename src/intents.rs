//! Replayable register and transfer requests
//!
//! A JSON array of intents that the binary feeds into a fresh registry.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::{Block, Metadata, PropertyDetails, Registry, RegistryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Register {
        property_id: String,
        owner: String,
        #[serde(default)]
        details: Option<PropertyDetails>,
        /// Extra metadata, merged over `details`
        #[serde(default)]
        metadata: Metadata,
    },
    Transfer {
        property_id: String,
        current_owner: String,
        new_owner: String,
        #[serde(default)]
        note: String,
    },
}

impl Intent {
    pub fn property_id(&self) -> &str {
        match self {
            Intent::Register { property_id, .. } | Intent::Transfer { property_id, .. } => property_id,
        }
    }

    /// Submits the intent to the registry
    pub async fn apply(&self, registry: &Registry) -> Result<Block, RegistryError> {
        match self {
            Intent::Register {
                property_id,
                owner,
                details,
                metadata,
            } => {
                let mut merged: Metadata = details.clone().map(Metadata::from).unwrap_or_default();
                merged.extend(metadata.clone());
                registry.register_property(property_id, owner, merged).await
            }
            Intent::Transfer {
                property_id,
                current_owner,
                new_owner,
                note,
            } => {
                registry
                    .transfer_property(property_id, current_owner, new_owner, note)
                    .await
            }
        }
    }
}

/// Outcome of replaying a list of intents
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Blocks sealed, in submission order
    pub sealed: Vec<Block>,

    /// Position in the input and the reason for every refused intent
    pub rejected: Vec<(usize, RegistryError)>,
}

pub fn parse_intents(json: &str) -> Result<Vec<Intent>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Applies intents one after another; a refused intent does not stop the
/// rest
pub async fn replay(registry: &Registry, intents: &[Intent]) -> ReplayReport {
    let mut report = ReplayReport::default();

    for (position, intent) in intents.iter().enumerate() {
        match intent.apply(registry).await {
            Ok(block) => {
                info!("Intent #{} on {} sealed as block {}", position, intent.property_id(), block.index);
                report.sealed.push(block);
            }
            Err(err) => {
                warn!("Intent #{} on {} refused: {}", position, intent.property_id(), err);
                report.rejected.push((position, err));
            }
        }
    }

    report
}
