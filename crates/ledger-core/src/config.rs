use crate::{
    constants::{DEFAULT_DIFFICULTY, DEFAULT_STORAGE_FILE, HASH_HEX_SIZE},
    error::ConfigError,
    mine::MiningOptions,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

/// What to do with a ledger file that exists but cannot be trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptStorePolicy {
    /// Move the file aside, then start from a fresh genesis block.
    #[default]
    Preserve,
    /// Start from a fresh genesis block and overwrite the file.
    Discard,
    /// Fail startup with [`crate::LedgerError::CorruptStore`].
    Refuse,
}

impl CorruptStorePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorruptStorePolicy::Preserve => "preserve",
            CorruptStorePolicy::Discard => "discard",
            CorruptStorePolicy::Refuse => "refuse",
        }
    }
}

impl fmt::Display for CorruptStorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorruptStorePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preserve" => Ok(CorruptStorePolicy::Preserve),
            "discard" => Ok(CorruptStorePolicy::Discard),
            "refuse" => Ok(CorruptStorePolicy::Refuse),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub parallel: bool,
    pub max_nonce: Option<u64>,
}

impl MiningConfig {
    pub fn options(&self) -> MiningOptions {
        MiningOptions {
            parallel: self.parallel,
            max_nonce: self.max_nonce,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Required leading `'0'` hex characters in every block hash.
    pub difficulty: usize,
    pub storage_path: PathBuf,
    /// Persist after every mutating operation.
    pub autosave: bool,
    pub on_corrupt: CorruptStorePolicy,
    pub mining: MiningConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            storage_path: PathBuf::from(DEFAULT_STORAGE_FILE),
            autosave: true,
            on_corrupt: CorruptStorePolicy::default(),
            mining: MiningConfig::default(),
        }
    }
}

impl LedgerConfig {
    pub fn new(difficulty: usize, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            difficulty,
            storage_path: storage_path.into(),
            ..Self::default()
        }
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptStorePolicy) -> Self {
        self.on_corrupt = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty > HASH_HEX_SIZE {
            return Err(ConfigError::DifficultyTooHigh {
                difficulty: self.difficulty,
                max: HASH_HEX_SIZE,
            });
        }
        Ok(())
    }
}
