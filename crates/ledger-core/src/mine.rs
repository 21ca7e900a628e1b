use crate::{
    canonical,
    constants::{CANCEL_POLL_INTERVAL, HASH_HEX_SIZE, NONCE_BATCH},
    pow::meets_difficulty,
    Block,
};
use rayon::prelude::*;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    #[error("mining cancelled")]
    Cancelled,
    #[error("no nonce up to {max_nonce} satisfies difficulty {difficulty}")]
    Exhausted { max_nonce: u64, difficulty: usize },
    #[error("difficulty {0} exceeds the hash length")]
    UnreachableDifficulty(usize),
}

/// Shared stop flag for an in-flight search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MiningOptions {
    /// Split the nonce space across rayon's pool.
    pub parallel: bool,
    /// Inclusive upper bound on the nonce; `None` searches the whole `u64` space.
    pub max_nonce: Option<u64>,
    pub cancel: Option<CancelToken>,
}

impl MiningOptions {
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// The block's canonical encoding split around the nonce, so each attempt
/// only formats an integer instead of re-encoding the transactions.
///
/// Keys are sorted, so the layout is always
/// `{"index": .., "nonce": <nonce>, "previous_hash": .., "timestamp": .., "transactions": ..}`.
struct NonceTemplate {
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

impl NonceTemplate {
    fn new(block: &Block) -> Self {
        let head = canonical::to_canonical_vec(&json!({ "index": block.index })).unwrap_or_default();
        let tail = canonical::to_canonical_vec(&json!({
            "previous_hash": block.previous_hash,
            "timestamp": block.timestamp,
            "transactions": block.transactions,
        }))
        .unwrap_or_default();

        let mut prefix = head[..head.len().saturating_sub(1)].to_vec();
        prefix.extend_from_slice(b", \"nonce\": ");
        let mut suffix = b", ".to_vec();
        suffix.extend_from_slice(tail.get(1..).unwrap_or_default());
        Self { prefix, suffix }
    }

    fn hash(&self, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.prefix);
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(&self.suffix);
        hex::encode(hasher.finalize())
    }
}

/// Bounded, cancellable proof-of-work search.
///
/// Both search strategies return the lowest satisfying nonce, so a block
/// mined in parallel is bit-for-bit the block a sequential miner would
/// produce.
pub fn mine_with(mut block: Block, difficulty: usize, opts: &MiningOptions) -> Result<Block, MineError> {
    if difficulty > HASH_HEX_SIZE {
        return Err(MineError::UnreachableDifficulty(difficulty));
    }
    let template = NonceTemplate::new(&block);
    let ceiling = opts.max_nonce.unwrap_or(u64::MAX);

    let (nonce, hash) = if opts.parallel {
        search_parallel(&template, difficulty, ceiling, opts)?
    } else {
        search_sequential(&template, difficulty, ceiling, opts)?
    };

    block.nonce = nonce;
    block.hash = hash;
    info!(
        "Mined block {} with nonce {} and hash {}",
        block.index, block.nonce, block.hash
    );
    Ok(block)
}

fn search_sequential(
    template: &NonceTemplate,
    difficulty: usize,
    ceiling: u64,
    opts: &MiningOptions,
) -> Result<(u64, String), MineError> {
    let mut nonce = 0u64;
    loop {
        if nonce % CANCEL_POLL_INTERVAL == 0 && opts.cancelled() {
            return Err(MineError::Cancelled);
        }
        let hash = template.hash(nonce);
        if meets_difficulty(&hash, difficulty) {
            return Ok((nonce, hash));
        }
        if nonce == ceiling {
            return Err(MineError::Exhausted {
                max_nonce: ceiling,
                difficulty,
            });
        }
        nonce += 1;
    }
}

fn search_parallel(
    template: &NonceTemplate,
    difficulty: usize,
    ceiling: u64,
    opts: &MiningOptions,
) -> Result<(u64, String), MineError> {
    let mut start = 0u64;
    loop {
        if opts.cancelled() {
            return Err(MineError::Cancelled);
        }
        let end = start.saturating_add(NONCE_BATCH - 1).min(ceiling);
        // find_first keeps the lowest hit in the batch, not whichever thread wins.
        let hit = (start..=end)
            .into_par_iter()
            .find_first(|nonce| meets_difficulty(&template.hash(*nonce), difficulty));
        if let Some(nonce) = hit {
            return Ok((nonce, template.hash(nonce)));
        }
        if end == ceiling {
            return Err(MineError::Exhausted {
                max_nonce: ceiling,
                difficulty,
            });
        }
        start = end + 1;
    }
}
