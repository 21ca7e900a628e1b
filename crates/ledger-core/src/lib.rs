use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod canonical;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod mine;
pub mod pool;
pub mod transaction;

pub use chain::ChainError;
pub use config::{CorruptStorePolicy, LedgerConfig, MiningConfig};
pub use error::{ConfigError, LedgerError, StoreError};
pub use ledger::{Ledger, LedgerState, LedgerStore, Startup, StoreState};
pub use mine::{CancelToken, MineError, MiningOptions};
pub use pool::TransactionPool;
pub use transaction::{Transaction, ValidationError};

use constants::GENESIS_PREVIOUS_HASH;

/// Fractional UNIX seconds.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn genesis_previous_hash() -> String {
    GENESIS_PREVIOUS_HASH.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default = "genesis_previous_hash")]
    pub previous_hash: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub hash: String,
}

impl Block {
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: impl Into<String>) -> Self {
        Self {
            index,
            timestamp: now_timestamp(),
            transactions,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Unmined genesis template: index 0, no transactions, sentinel parent.
    pub fn genesis() -> Self {
        Self::new(0, Vec::new(), GENESIS_PREVIOUS_HASH)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// The canonical bytes the block hash is computed over. `hash` itself is
    /// not part of it.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let fields = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });
        // Every field is plain JSON data; encoding into a Vec cannot fail.
        canonical::to_canonical_vec(&fields).unwrap_or_default()
    }

    /// Lowercase hex SHA-256 of [`Block::hash_bytes`].
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn has_valid_hash(&self) -> bool {
        !self.hash.is_empty() && self.hash == self.compute_hash()
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        pow::meets_difficulty(&self.hash, difficulty)
    }

    /// Transport record, including `hash`.
    pub fn to_record(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Inverse of [`Block::to_record`]; tolerates missing optional fields.
    pub fn from_record(record: Value) -> serde_json::Result<Self> {
        serde_json::from_value(record)
    }
}

pub mod pow {
    use super::Block;

    /// Mine the block by trying nonces from 0 upward until the hash has at
    /// least `difficulty` leading `'0'` hex characters.
    ///
    /// Unbounded: see [`crate::mine::mine_with`] for the bounded,
    /// cancellable variant.
    pub fn mine_block(mut block: Block, difficulty: usize) -> Block {
        block.nonce = 0;
        loop {
            let hash = block.compute_hash();
            if meets_difficulty(&hash, difficulty) {
                block.hash = hash;
                return block;
            }
            block.nonce = block.nonce.wrapping_add(1);
        }
    }

    pub fn count_leading_zero_hex(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }

    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        hash.len() >= difficulty && hash.as_bytes()[..difficulty].iter().all(|b| *b == b'0')
    }
}
