use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use super::block::{meets_difficulty, Block};

/// How many nonces are tried between two looks at the cancel flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Errors that can occur while running the miner as a task
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("Mining was cancelled")]
    Cancelled,

    #[error("Mining timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Mining task failed: {0}")]
    TaskFailed(String),
}

/// Performs proof of work on a candidate block
///
/// # Arguments
///
/// * `candidate` - The block to seal; its nonce is the starting point
/// * `difficulty` - Number of leading hex zeros required in the hash
///
/// # Returns
///
/// The sealed block with `nonce` and `hash` filled in
pub fn mine(mut candidate: Block, difficulty: u32) -> Block {
    loop {
        let hash = candidate.calculate_hash();
        if meets_difficulty(&hash, difficulty) {
            candidate.hash = hash;
            return candidate;
        }
        candidate.nonce = candidate.nonce.wrapping_add(1);
    }
}

/// Performs proof of work until a valid nonce is found or `cancel` is set
///
/// # Returns
///
/// The sealed block, or `None` if the search was abandoned. An abandoned
/// candidate is simply dropped; nothing outside it was touched.
pub fn mine_cancellable(mut candidate: Block, difficulty: u32, cancel: &AtomicBool) -> Option<Block> {
    let start_nonce = candidate.nonce;

    loop {
        let hash = candidate.calculate_hash();
        if meets_difficulty(&hash, difficulty) {
            debug!(
                "Sealed block {} after {} attempts (nonce={}, hash={})",
                candidate.index,
                candidate.nonce.wrapping_sub(start_nonce).wrapping_add(1),
                candidate.nonce,
                hash
            );
            candidate.hash = hash;
            return Some(candidate);
        }

        candidate.nonce = candidate.nonce.wrapping_add(1);

        if candidate.nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            debug!("Abandoned mining of block {} at nonce {}", candidate.index, candidate.nonce);
            return None;
        }
    }
}

/// Runs the miner on the blocking pool, optionally bounded by a timeout
///
/// On timeout the search is told to stop and the candidate is discarded.
///
/// # Arguments
///
/// * `candidate` - The block to seal
/// * `difficulty` - Number of leading hex zeros required in the hash
/// * `timeout` - Upper bound on the search, `None` for no bound
pub async fn mine_with_timeout(
    candidate: Block,
    difficulty: u32,
    timeout: Option<Duration>,
) -> Result<Block, MiningError> {
    let cancel = Arc::new(AtomicBool::new(false));
    let task_cancel = Arc::clone(&cancel);
    let task = tokio::task::spawn_blocking(move || mine_cancellable(candidate, difficulty, &task_cancel));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                warn!("Mining exceeded {:?} at difficulty {}, candidate discarded", limit, difficulty);
                return Err(MiningError::TimedOut(limit));
            }
        },
        None => task.await,
    };

    match joined {
        Ok(Some(block)) => Ok(block),
        Ok(None) => Err(MiningError::Cancelled),
        Err(err) => Err(MiningError::TaskFailed(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::{zero_hash, Action, Metadata};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn candidate(property_id: &str) -> Block {
        Block::candidate(1, Action::Register, property_id, "Alice", Metadata::new(), zero_hash())
    }

    #[test]
    fn test_difficulty_zero_takes_one_attempt() {
        let block = mine(candidate("P1"), 0);

        assert_eq!(block.nonce, 0);
        assert_eq!(block.hash, block.calculate_hash());
    }

    #[test]
    fn test_mining_produces_leading_zeros() {
        let block = mine(candidate("P1"), 2);

        assert!(block.hash.starts_with("00"));
        assert!(block.has_consistent_hash());
        assert!(block.meets_difficulty(2));
    }

    #[test]
    fn test_seeded_candidates_terminate() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..8 {
            let id = format!("P{}", rng.gen_range(0..10_000));
            let difficulty = rng.gen_range(1..=3);
            let block = mine(candidate(&id), difficulty);

            assert!(block.meets_difficulty(difficulty));
            assert_eq!(block.hash, block.calculate_hash());
        }
    }

    #[test]
    fn test_mining_is_deterministic_for_fixed_content() {
        let block = candidate("P7");
        let first = mine(block.clone(), 2);
        let second = mine(block, 2);

        assert_eq!(first.nonce, second.nonce);
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn test_cancelled_search_returns_none() {
        let cancel = AtomicBool::new(true);
        // 64 zeros is unreachable, so only the cancel flag ends the loop.
        assert!(mine_cancellable(candidate("P1"), 64, &cancel).is_none());
    }

    #[tokio::test]
    async fn test_mine_with_timeout_seals() {
        let block = mine_with_timeout(candidate("P1"), 1, Some(Duration::from_secs(30)))
            .await
            .unwrap();

        assert!(block.meets_difficulty(1));
    }

    #[tokio::test]
    async fn test_mine_with_timeout_gives_up() {
        let result = mine_with_timeout(candidate("P1"), 64, Some(Duration::from_millis(20))).await;

        assert!(matches!(result, Err(MiningError::TimedOut(_))));
    }
}
