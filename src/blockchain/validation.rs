use log::warn;
use thiserror::Error;

use super::block::{zero_hash, Action, Block};

/// Reasons a chain fails verification
///
/// Each variant carries the index of the first offending block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Chain is empty")]
    Empty,

    #[error("Genesis block is malformed")]
    GenesisMalformed,

    #[error("Block {index} is stored at the wrong position")]
    IndexMismatch { index: usize },

    #[error("Block {index} hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("Block {index} does not link to the previous block")]
    BrokenLink { index: usize },

    #[error("Block {index} does not satisfy the proof of work")]
    ProofOfWork { index: usize },
}

impl ChainError {
    /// Index of the offending block, if the failure is tied to one
    pub fn block_index(&self) -> Option<usize> {
        match self {
            ChainError::Empty => None,
            ChainError::GenesisMalformed => Some(0),
            ChainError::IndexMismatch { index }
            | ChainError::HashMismatch { index }
            | ChainError::BrokenLink { index }
            | ChainError::ProofOfWork { index } => Some(*index),
        }
    }
}

/// Validates a sequence of blocks against a difficulty
///
/// Recomputes every hash, checks linkage to the predecessor and the proof
/// of work. Read only.
///
/// # Arguments
///
/// * `chain` - The blocks in ledger order, genesis first
/// * `difficulty` - Number of leading hex zeros every hash must have
///
/// # Returns
///
/// `Ok(())` if the chain is intact, otherwise the first failure found
pub fn validate_chain(chain: &[Block], difficulty: u32) -> Result<(), ChainError> {
    let result = check_chain(chain, difficulty);
    if let Err(err) = &result {
        warn!("Chain validation failed: {}", err);
    }
    result
}

fn check_chain(chain: &[Block], difficulty: u32) -> Result<(), ChainError> {
    let genesis = chain.first().ok_or(ChainError::Empty)?;

    if genesis.index != 0 || genesis.action != Action::Genesis || genesis.previous_hash != zero_hash() {
        return Err(ChainError::GenesisMalformed);
    }
    check_block(genesis, 0, difficulty)?;

    for (i, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let index = i + 1;

        if current.index != index as u64 {
            return Err(ChainError::IndexMismatch { index });
        }
        if current.hash != current.calculate_hash() {
            return Err(ChainError::HashMismatch { index });
        }
        if current.previous_hash != previous.hash {
            return Err(ChainError::BrokenLink { index });
        }
        if !current.meets_difficulty(difficulty) {
            return Err(ChainError::ProofOfWork { index });
        }
    }

    Ok(())
}

fn check_block(block: &Block, index: usize, difficulty: u32) -> Result<(), ChainError> {
    if block.hash != block.calculate_hash() {
        return Err(ChainError::HashMismatch { index });
    }
    if !block.meets_difficulty(difficulty) {
        return Err(ChainError::ProofOfWork { index });
    }
    Ok(())
}
