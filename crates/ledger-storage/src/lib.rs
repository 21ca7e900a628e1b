//! File-backed persistence for the ledger.
//!
//! The store implements [`ledger_core::LedgerStore`], which lives in the
//! core crate so the ledger can stay generic over where it is written.

pub mod json_store;

pub use json_store::{JsonFileStore, PersistedLedger};
