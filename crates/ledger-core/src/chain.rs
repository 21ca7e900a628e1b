//! Whole-chain validation and the longest-valid-chain rule.

use crate::{constants::GENESIS_PREVIOUS_HASH, Block};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain is empty")]
    Empty,
    #[error("genesis block has index {0}, expected 0")]
    GenesisIndex(u64),
    #[error("genesis block previous_hash must be \"0\", found {0:?}")]
    GenesisPreviousHash(String),
    #[error("block {position} has no hash")]
    MissingHash { position: usize },
    #[error("block at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: u64 },
    #[error("block {position} does not link to its predecessor")]
    BrokenLink { position: usize },
    #[error("block {position} hash does not match its contents")]
    HashMismatch { position: usize },
    #[error("block {position} hash does not meet difficulty {difficulty}")]
    InsufficientWork { position: usize, difficulty: usize },
}

fn check_sealed(block: &Block, position: usize, difficulty: usize) -> Result<(), ChainError> {
    if block.hash.is_empty() {
        return Err(ChainError::MissingHash { position });
    }
    if block.hash != block.compute_hash() {
        return Err(ChainError::HashMismatch { position });
    }
    if !block.meets_difficulty(difficulty) {
        return Err(ChainError::InsufficientWork {
            position,
            difficulty,
        });
    }
    Ok(())
}

pub fn check_genesis(block: &Block, difficulty: usize) -> Result<(), ChainError> {
    if block.index != 0 {
        return Err(ChainError::GenesisIndex(block.index));
    }
    if block.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(ChainError::GenesisPreviousHash(block.previous_hash.clone()));
    }
    check_sealed(block, 0, difficulty)
}

/// Check `block` as the direct successor of `prev`, which sits at `block.index - 1`.
pub fn check_successor(prev: &Block, block: &Block, difficulty: usize) -> Result<(), ChainError> {
    let expected = prev.index.wrapping_add(1);
    let position = expected as usize;
    if block.index != expected {
        return Err(ChainError::IndexMismatch {
            position,
            index: block.index,
        });
    }
    if block.previous_hash != prev.hash {
        return Err(ChainError::BrokenLink { position });
    }
    check_sealed(block, position, difficulty)
}

/// Report the first rule `chain` breaks, if any.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ChainError> {
    let genesis = chain.first().ok_or(ChainError::Empty)?;
    check_genesis(genesis, difficulty)?;
    // Each predecessor's index has already been checked against its position.
    for pair in chain.windows(2) {
        check_successor(&pair[0], &pair[1], difficulty)?;
    }
    Ok(())
}

pub fn is_valid(chain: &[Block], difficulty: usize) -> bool {
    validate_chain(chain, difficulty).is_ok()
}

/// Decode a raw candidate chain; one bad record rejects the whole candidate.
pub fn decode_chain(records: Vec<Value>) -> serde_json::Result<Vec<Block>> {
    records.into_iter().map(Block::from_record).collect()
}

/// Longest-valid-chain rule.
///
/// Returns the candidate that should replace a local chain of `local_len`
/// blocks, or `None` to keep the local chain. Only candidates strictly
/// longer than everything seen so far are considered, so among equally long
/// winners the first one in input order is kept.
pub fn resolve<I>(local_len: usize, candidates: I, difficulty: usize) -> Option<Vec<Block>>
where
    I: IntoIterator<Item = Vec<Value>>,
{
    let mut best: Option<Vec<Block>> = None;
    let mut max_len = local_len;

    for (i, records) in candidates.into_iter().enumerate() {
        if records.len() <= max_len {
            debug!("candidate {i}: {} blocks, not longer than {max_len}", records.len());
            continue;
        }
        let blocks = match decode_chain(records) {
            Ok(blocks) => blocks,
            Err(e) => {
                debug!("candidate {i}: skipped, malformed block record: {e}");
                continue;
            }
        };
        match validate_chain(&blocks, difficulty) {
            Ok(()) => {
                max_len = blocks.len();
                best = Some(blocks);
            }
            Err(e) => debug!("candidate {i}: rejected, {e}"),
        }
    }

    if let Some(chain) = &best {
        info!("adopting candidate chain of {} blocks (local had {local_len})", chain.len());
    }
    best
}
