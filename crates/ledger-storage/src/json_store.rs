use ledger_core::{
    chain, Block, LedgerState, LedgerStore, StoreError, StoreState, Transaction,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, warn};

/// Both on-disk layouts a ledger file may use.
///
/// Older ledgers wrote the chain as a bare array and had no pending pool.
/// Records are kept as raw JSON here and decoded in [`PersistedLedger::into_state`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PersistedLedger {
    Legacy(Vec<Value>),
    Current {
        #[serde(default)]
        chain: Vec<Value>,
        #[serde(default)]
        pending_transactions: Value,
    },
}

impl PersistedLedger {
    /// Decode the records. A bad block makes the whole file unusable; a bad
    /// pending entry is dropped on its own.
    pub fn into_state(self) -> Result<LedgerState, String> {
        let (chain, pending) = match self {
            PersistedLedger::Legacy(chain) => (chain, Value::Null),
            PersistedLedger::Current {
                chain,
                pending_transactions,
            } => (chain, pending_transactions),
        };
        let chain = chain::decode_chain(chain).map_err(|e| format!("malformed block record: {e}"))?;

        let pending = match pending {
            Value::Array(records) => records
                .into_iter()
                .enumerate()
                .filter_map(|(i, record)| match serde_json::from_value::<Transaction>(record) {
                    Ok(tx) => Some(tx),
                    Err(e) => {
                        warn!("dropping unreadable pending transaction #{i}: {e}");
                        None
                    }
                })
                .collect(),
            Value::Null => Vec::new(),
            other => {
                warn!("ignoring pending_transactions of unexpected shape: {other}");
                Vec::new()
            }
        };
        Ok(LedgerState { chain, pending })
    }
}

/// Shape written by [`JsonFileStore::save`].
#[derive(Serialize)]
struct Document<'a> {
    chain: &'a [Block],
    pending_transactions: &'a [Transaction],
}

/// Ledger state as one pretty-printed JSON document on disk.
///
/// Every save rewrites the whole file.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Where a corrupt file is moved: `<name>.corrupt-<unix seconds>`, with a
    /// counter appended if that name is taken.
    fn quarantine_path(&self) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        let base = self.path.with_file_name(format!("{name}.corrupt-{secs}"));
        let mut candidate = base.clone();
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}-{n}", base.display()));
            n += 1;
        }
        candidate
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> StoreState {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no ledger file at {}", self.path.display());
                return StoreState::Absent;
            }
            Err(e) => {
                return StoreState::Corrupted {
                    reason: format!("cannot read {}: {e}", self.path.display()),
                }
            }
        };

        let persisted: PersistedLedger = match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => {
                return StoreState::Corrupted {
                    reason: format!("{} is not a ledger document: {e}", self.path.display()),
                }
            }
        };
        if matches!(persisted, PersistedLedger::Legacy(_)) {
            info!("{} uses the legacy chain-only layout", self.path.display());
        }

        match persisted.into_state() {
            Ok(state) => StoreState::Present(state),
            Err(reason) => StoreState::Corrupted { reason },
        }
    }

    fn save(&self, chain: &[Block], pending: &[Transaction]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let doc = Document {
            chain,
            pending_transactions: pending,
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        fs::write(&self.path, bytes).map_err(|e| self.io_error(e))?;
        debug!(
            "saved {} blocks and {} pending to {}",
            chain.len(),
            pending.len(),
            self.path.display()
        );
        Ok(())
    }

    fn quarantine(&self) -> Result<Option<PathBuf>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let target = self.quarantine_path();
        fs::rename(&self.path, &target).map_err(|e| self.io_error(e))?;
        Ok(Some(target))
    }
}
