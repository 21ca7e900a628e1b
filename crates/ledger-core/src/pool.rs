use crate::transaction::{Transaction, ValidationError};
use tracing::warn;

/// Admitted transactions waiting for the next block, in arrival order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionPool {
    txs: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore entries from disk without re-validating them.
    pub fn restore(txs: Vec<Transaction>) -> Self {
        Self { txs }
    }

    pub fn admit(&mut self, tx: Transaction) -> Result<(), ValidationError> {
        tx.validate()?;
        self.txs.push(tx);
        Ok(())
    }

    /// Copy of the pool for a mining attempt. Nothing is removed until
    /// [`TransactionPool::commit`].
    pub fn drain_for_mining(&self) -> Vec<Transaction> {
        self.txs.clone()
    }

    /// The snapshot has been sealed into a block.
    pub fn commit(&mut self) {
        self.txs.clear();
    }

    /// Drop restored entries that no longer pass validation.
    pub fn prune_invalid(&mut self) -> usize {
        let before = self.txs.len();
        self.txs.retain(|tx| match tx.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("dropping pending transaction {} -> {}: {e}", tx.sender, tx.recipient);
                false
            }
        });
        before - self.txs.len()
    }

    pub fn as_slice(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}
