mod helpers;

use helpers::*;
use ledger_core::{
    CorruptStorePolicy, Ledger, LedgerConfig, LedgerError, LedgerStore, Startup, StoreState,
    Transaction,
};
use ledger_storage::JsonFileStore;
use rand::Rng;
use serde_json::{json, Value};
use std::{fs, sync::Arc};

#[tokio::test]
async fn test_current_fixture_restores() -> anyhow::Result<()> {
    let (_dir, store) = create_store_with(CURRENT_FIXTURE);
    let (ledger, startup) = open_ledger(&store, FIXTURE_DIFFICULTY);

    assert_eq!(startup, Startup::Restored);
    assert_eq!(ledger.chain().len(), 3);
    assert!(ledger.validate());
    for block in ledger.chain() {
        assert_eq!(block.hash, block.compute_hash());
    }
    assert_eq!(
        ledger.chain()[0].hash,
        "0077bb0e2f1e778e44bdd4692067af8ddca1264a268e80fe5330c94150e61310"
    );

    let pending = ledger.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].sender, "Eve");
    assert!(pending[0].amount.is_u64());

    let block1 = &ledger.chain()[1];
    assert!(block1.transactions[0].amount.is_f64());
    assert_eq!(block1.transactions[1].metadata["memo"], json!("café ☕"));
    Ok(())
}

#[tokio::test]
async fn test_legacy_fixture_restores() -> anyhow::Result<()> {
    let (_dir, store) = create_store_with(LEGACY_FIXTURE);
    let (ledger, startup) = open_ledger(&store, FIXTURE_DIFFICULTY);

    assert_eq!(startup, Startup::Restored);
    assert!(ledger.pending().is_empty());
    assert!(ledger.validate());

    let (_dir2, current) = create_store_with(CURRENT_FIXTURE);
    let StoreState::Present(state) = current.load() else {
        panic!("current fixture should load");
    };
    assert_eq!(ledger.chain(), state.chain.as_slice());
    Ok(())
}

#[tokio::test]
async fn test_tied_float_timestamp_restores() -> anyhow::Result<()> {
    // 1792177401.00390625 sits exactly between two shortest renderings.
    let (_dir, store) = create_store_with(
        r#"[{"index": 0, "timestamp": 1792177401.0039062, "transactions": [], "previous_hash": "0", "nonce": 32, "hash": "0a8c6aed467069c8d517d3046a26d19d57d356b6a94ebb0a46483139df1b5dbd"}]"#,
    );
    let (ledger, startup) = open_ledger(&store, 1);
    assert_eq!(startup, Startup::Restored);
    assert_eq!(ledger.validation_report(), Ok(()));
    Ok(())
}

#[tokio::test]
async fn test_legacy_file_is_rewritten_in_current_layout() -> anyhow::Result<()> {
    let (_dir, store) = create_store_with(LEGACY_FIXTURE);
    let (mut ledger, _) = open_ledger(&store, FIXTURE_DIFFICULTY);
    ledger.admit_transaction(Transaction::new("Gina", "Hal", 4))?;

    let doc: Value = serde_json::from_str(&fs::read_to_string(store.path())?)?;
    assert_eq!(doc["chain"].as_array().map(Vec::len), Some(3));
    assert_eq!(doc["pending_transactions"][0]["sender"], json!("Gina"));
    Ok(())
}

#[tokio::test]
async fn test_extend_fixture_chain() -> anyhow::Result<()> {
    let (_dir, store) = create_store_with(CURRENT_FIXTURE);
    {
        let (mut ledger, _) = open_ledger(&store, FIXTURE_DIFFICULTY);
        let block = ledger.mine()?;
        assert_eq!(block.index, 3);
        assert_eq!(block.transactions[0].sender, "Eve");
        assert!(ledger.pending().is_empty());
    }
    let (ledger, startup) = open_ledger(&store, FIXTURE_DIFFICULTY);
    assert_eq!(startup, Startup::Restored);
    assert_eq!(ledger.chain().len(), 4);
    assert!(ledger.validate());
    Ok(())
}

#[tokio::test]
async fn test_storage_persistence() -> anyhow::Result<()> {
    let (_dir, file) = create_temp_dir();
    let store = Arc::new(JsonFileStore::new(&file));
    let saved = {
        let (mut ledger, startup) = open_ledger(&store, 1);
        assert_eq!(startup, Startup::Genesis);
        assert!(file.exists());
        ledger.admit_record(json!({"sender": "Alice", "recipient": "Bob", "amount": 10}))?;
        ledger.mine()?;
        ledger.admit_transaction(Transaction::with_f64_amount("Bob", "Carol", 0.25)?)?;
        ledger.state()
    };

    let (ledger, startup) = open_ledger(&store, 1);
    assert_eq!(startup, Startup::Restored);
    assert_eq!(ledger.state(), saved);
    assert_eq!(ledger.chain().len(), 2);
    assert_eq!(ledger.chain()[1].transactions[0].sender, "Alice");
    assert_eq!(ledger.pending()[0].recipient, "Carol");
    Ok(())
}

#[tokio::test]
async fn test_random_pending_survives_reload() -> anyhow::Result<()> {
    let (_dir, file) = create_temp_dir();
    let store = Arc::new(JsonFileStore::new(&file));
    let mut rng = rand::thread_rng();
    let expected = {
        let (mut ledger, _) = open_ledger(&store, 0);
        for i in 0..25 {
            let amount: f64 = rng.gen_range(0.01..1_000_000.0);
            let tx = Transaction::with_f64_amount(format!("sender{i}"), "pool", amount)?
                .with_meta("seq", json!(i));
            ledger.admit_transaction(tx)?;
        }
        ledger.pending().to_vec()
    };

    let (ledger, _) = open_ledger(&store, 0);
    assert_eq!(ledger.pending(), expected.as_slice());
    Ok(())
}

#[tokio::test]
async fn test_parent_directories_are_created() -> anyhow::Result<()> {
    let (dir, _) = create_temp_dir();
    let file = dir.path().join("nested").join("deeper").join("ledger.json");
    let store = Arc::new(JsonFileStore::new(&file));
    let (_ledger, startup) = open_ledger(&store, 1);
    assert_eq!(startup, Startup::Genesis);
    assert!(file.exists());
    Ok(())
}

#[tokio::test]
async fn test_truncated_file_is_preserved() -> anyhow::Result<()> {
    let truncated = &CURRENT_FIXTURE[..CURRENT_FIXTURE.len() / 2];
    let (dir, store) = create_store_with(truncated);
    assert!(matches!(store.load(), StoreState::Corrupted { .. }));

    let (ledger, startup) = open_ledger(&store, 1);
    let Startup::Recovered { preserved_at, .. } = startup else {
        panic!("expected recovery, got {startup:?}");
    };
    let preserved_at = preserved_at.expect("corrupt file should be moved aside");
    assert_eq!(fs::read_to_string(&preserved_at)?, truncated);
    assert_eq!(quarantined_files(&dir), vec![preserved_at]);

    assert_eq!(ledger.chain().len(), 1);
    assert!(matches!(store.load(), StoreState::Present(_)));
    Ok(())
}

#[tokio::test]
async fn test_tampered_fixture_is_recovered() -> anyhow::Result<()> {
    let tampered = CURRENT_FIXTURE.replacen("\"amount\": 2.5", "\"amount\": 25", 1);
    assert_ne!(tampered, CURRENT_FIXTURE);
    let (dir, store) = create_store_with(&tampered);

    let (ledger, startup) = open_ledger(&store, FIXTURE_DIFFICULTY);
    assert!(matches!(startup, Startup::Recovered { .. }));
    assert_eq!(ledger.chain().len(), 1);
    assert_eq!(quarantined_files(&dir).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_fixture_fails_at_higher_difficulty() -> anyhow::Result<()> {
    let (_dir, store) = create_store_with(CURRENT_FIXTURE);
    let (_ledger, startup) = open_ledger(&store, FIXTURE_DIFFICULTY + 1);
    assert!(matches!(startup, Startup::Recovered { .. }));
    Ok(())
}

#[tokio::test]
async fn test_refuse_policy_leaves_file_alone() -> anyhow::Result<()> {
    let (dir, store) = create_store_with("{ not json");
    let config = LedgerConfig::new(1, store.path()).with_corrupt_policy(CorruptStorePolicy::Refuse);

    let result = Ledger::open(store.clone(), config);
    assert!(matches!(result, Err(LedgerError::CorruptStore { .. })));
    assert_eq!(fs::read_to_string(store.path())?, "{ not json");
    assert!(quarantined_files(&dir).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_discard_policy_overwrites() -> anyhow::Result<()> {
    let (dir, store) = create_store_with("[1, 2, 3]");
    let config = LedgerConfig::new(1, store.path()).with_corrupt_policy(CorruptStorePolicy::Discard);

    let (ledger, startup) = Ledger::open(store.clone(), config)?;
    assert!(matches!(
        startup,
        Startup::Recovered {
            preserved_at: None,
            ..
        }
    ));
    assert!(quarantined_files(&dir).is_empty());
    assert_eq!(ledger.chain().len(), 1);
    Ok(())
}
