use crate::{
    chain::{self, ChainError},
    config::{CorruptStorePolicy, LedgerConfig},
    error::{LedgerError, Result, StoreError},
    mine::{self, CancelToken, MiningOptions},
    pool::TransactionPool,
    Block, Transaction,
};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

/// Chain and pending pool as read back from a store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerState {
    pub chain: Vec<Block>,
    pub pending: Vec<Transaction>,
}

/// Result of reading a store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreState {
    /// Nothing has been written yet.
    Absent,
    /// Something is there but cannot be decoded.
    Corrupted { reason: String },
    Present(LedgerState),
}

/// Trait the storage backends implement for the ledger to persist itself.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> StoreState;
    /// Write chain and pending pool together, replacing what was there.
    fn save(&self, chain: &[Block], pending: &[Transaction]) -> std::result::Result<(), StoreError>;
    /// Move unusable data aside so it can be inspected. Returns the new
    /// location, or `None` if there was nothing to move.
    fn quarantine(&self) -> std::result::Result<Option<PathBuf>, StoreError>;
}

/// How [`Ledger::open`] obtained its chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Startup {
    Restored,
    Genesis,
    Recovered {
        reason: String,
        preserved_at: Option<PathBuf>,
    },
}

/// The ledger aggregate: one chain, one pending pool, one store.
///
/// Not internally synchronized; callers sharing a ledger between threads
/// wrap it in a mutex so admission, mining and resolution never interleave.
pub struct Ledger<S: LedgerStore> {
    chain: Vec<Block>,
    pool: TransactionPool,
    config: LedgerConfig,
    store: Arc<S>,
}

impl<S: LedgerStore> Ledger<S> {
    /// Load persisted state, or mine a fresh genesis block when there is
    /// none (or it can't be trusted, subject to `config.on_corrupt`).
    pub fn open(store: Arc<S>, config: LedgerConfig) -> Result<(Self, Startup)> {
        config.validate()?;
        let mut ledger = Self {
            chain: Vec::new(),
            pool: TransactionPool::new(),
            config,
            store,
        };

        let startup = match ledger.store.load() {
            StoreState::Present(state) => {
                match chain::validate_chain(&state.chain, ledger.config.difficulty) {
                    Ok(()) => {
                        info!(
                            "restored ledger: {} blocks, {} pending",
                            state.chain.len(),
                            state.pending.len()
                        );
                        ledger.chain = state.chain;
                        ledger.pool = TransactionPool::restore(state.pending);
                        return Ok((ledger, Startup::Restored));
                    }
                    Err(e) => ledger.recover(format!("stored chain failed validation: {e}"))?,
                }
            }
            StoreState::Corrupted { reason } => ledger.recover(reason)?,
            StoreState::Absent => Startup::Genesis,
        };

        ledger.create_genesis()?;
        Ok((ledger, startup))
    }

    fn recover(&self, reason: String) -> Result<Startup> {
        warn!("ledger store is unusable: {reason}");
        let preserved_at = match self.config.on_corrupt {
            CorruptStorePolicy::Refuse => return Err(LedgerError::CorruptStore { reason }),
            // Nothing will overwrite the file, so it can stay where it is.
            CorruptStorePolicy::Preserve if !self.config.autosave => None,
            CorruptStorePolicy::Preserve => self.store.quarantine()?,
            CorruptStorePolicy::Discard => None,
        };
        if let Some(path) = &preserved_at {
            warn!("corrupt ledger moved to {}", path.display());
        }
        Ok(Startup::Recovered {
            reason,
            preserved_at,
        })
    }

    fn create_genesis(&mut self) -> Result<()> {
        let genesis = mine::mine_with(Block::genesis(), self.config.difficulty, &self.mining_options(None))?;
        info!("created genesis block {}", genesis.hash);
        self.chain = vec![genesis];
        self.pool = TransactionPool::new();
        self.autosave()
    }

    fn mining_options(&self, cancel: Option<CancelToken>) -> MiningOptions {
        MiningOptions {
            cancel,
            ..self.config.mining.options()
        }
    }

    fn autosave(&self) -> Result<()> {
        if self.config.autosave {
            self.save()?;
        }
        Ok(())
    }

    /// Write chain and pool regardless of `autosave`.
    pub fn save(&self) -> Result<()> {
        self.store.save(&self.chain, self.pool.as_slice())?;
        Ok(())
    }

    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.pool.admit(tx)?;
        self.autosave()
    }

    /// Admit a raw JSON record after a structural check.
    pub fn admit_record(&mut self, record: Value) -> Result<()> {
        let tx = Transaction::from_value(record)?;
        self.admit_transaction(tx)
    }

    /// Seal every pending transaction into a new block.
    pub fn mine(&mut self) -> Result<Block> {
        self.mine_inner(None)
    }

    pub fn mine_with_cancel(&mut self, cancel: &CancelToken) -> Result<Block> {
        self.mine_inner(Some(cancel.clone()))
    }

    fn mine_inner(&mut self, cancel: Option<CancelToken>) -> Result<Block> {
        if self.pool.is_empty() {
            return Err(LedgerError::EmptyPool);
        }
        // Restored entries were never re-checked; do it now.
        if self.pool.prune_invalid() > 0 {
            self.autosave()?;
            if self.pool.is_empty() {
                return Err(LedgerError::EmptyPool);
            }
        }

        let difficulty = self.config.difficulty;
        let opts = self.mining_options(cancel);
        let tip = self
            .chain
            .last()
            .ok_or(LedgerError::InvalidBlock(ChainError::Empty))?;
        let candidate = Block::new(tip.index + 1, self.pool.drain_for_mining(), tip.hash.clone());
        let block = mine::mine_with(candidate, difficulty, &opts)?;
        chain::check_successor(tip, &block, difficulty).map_err(LedgerError::InvalidBlock)?;

        self.chain.push(block.clone());
        self.pool.commit();
        self.autosave()?;
        Ok(block)
    }

    /// Replace the chain with the longest valid strictly-longer candidate.
    /// Returns whether a replacement happened. The pending pool is kept.
    pub fn resolve<I>(&mut self, candidates: I) -> Result<bool>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        match chain::resolve(self.chain.len(), candidates, self.config.difficulty) {
            Some(chain) => {
                self.chain = chain;
                self.autosave()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn validate(&self) -> bool {
        chain::is_valid(&self.chain, self.config.difficulty)
    }

    pub fn validation_report(&self) -> std::result::Result<(), ChainError> {
        chain::validate_chain(&self.chain, self.config.difficulty)
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &[Transaction] {
        self.pool.as_slice()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn chain_records(&self) -> Vec<Value> {
        self.chain.iter().map(Block::to_record).collect()
    }

    pub fn state(&self) -> LedgerState {
        LedgerState {
            chain: self.chain.clone(),
            pending: self.pool.drain_for_mining(),
        }
    }

    /// Raw access for repair tooling. Editing a block without re-mining it
    /// invalidates the chain.
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.chain
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}
