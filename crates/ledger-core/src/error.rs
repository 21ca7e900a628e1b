use crate::{chain::ChainError, mine::MineError, transaction::ValidationError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a [`crate::LedgerStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode ledger state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("difficulty {difficulty} exceeds the maximum of {max}")]
    DifficultyTooHigh { difficulty: usize, max: usize },
    #[error("unknown corrupt-store policy {0:?} (expected preserve, discard or refuse)")]
    UnknownPolicy(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no transactions to mine")]
    EmptyPool,
    #[error("failed to persist ledger state: {0}")]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Mining(#[from] MineError),
    #[error("mined block rejected: {0}")]
    InvalidBlock(#[source] ChainError),
    #[error("stored ledger is corrupt: {reason}")]
    CorruptStore { reason: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
