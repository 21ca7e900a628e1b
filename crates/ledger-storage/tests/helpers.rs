#![allow(dead_code)]

use ledger_core::{Ledger, LedgerConfig, Startup};
use ledger_storage::JsonFileStore;
use std::{fs, path::PathBuf, sync::Arc};
use tempfile::{tempdir, TempDir};

pub const CURRENT_FIXTURE: &str = include_str!("fixtures/current.json");
pub const LEGACY_FIXTURE: &str = include_str!("fixtures/legacy.json");
/// Difficulty the fixtures were mined at.
pub const FIXTURE_DIFFICULTY: usize = 2;

pub fn create_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let file = temp_dir.path().join("blockchain.json");
    (temp_dir, file)
}

/// Temp dir holding a ledger file with the given contents.
pub fn create_store_with(contents: &str) -> (TempDir, Arc<JsonFileStore>) {
    let (temp_dir, file) = create_temp_dir();
    fs::write(&file, contents).expect("Failed to write ledger file");
    (temp_dir, Arc::new(JsonFileStore::new(file)))
}

pub fn open_ledger(
    store: &Arc<JsonFileStore>,
    difficulty: usize,
) -> (Ledger<JsonFileStore>, Startup) {
    let config = LedgerConfig::new(difficulty, store.path());
    Ledger::open(store.clone(), config).expect("Failed to open ledger")
}

/// Files left in `dir` whose name marks them as quarantined.
pub fn quarantined_files(dir: &TempDir) -> Vec<PathBuf> {
    fs::read_dir(dir.path())
        .expect("Failed to list temp dir")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.to_string_lossy().contains(".corrupt-"))
        .collect()
}
