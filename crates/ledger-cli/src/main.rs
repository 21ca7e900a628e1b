use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{
    constants::{DEFAULT_DIFFICULTY, DEFAULT_STORAGE_FILE},
    CorruptStorePolicy, Ledger, LedgerConfig, MiningConfig, Startup, Transaction,
};
use ledger_storage::JsonFileStore;
use serde_json::Value;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "Work with a proof-of-work ledger file")]
struct Cli {
    /// Ledger file
    #[arg(long, global = true, default_value = DEFAULT_STORAGE_FILE)]
    storage: PathBuf,

    /// Leading zero hex digits every block hash must carry
    #[arg(long, global = true, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Do not write changes back to the ledger file, nor move an unreadable one aside
    #[arg(long, global = true)]
    no_autosave: bool,

    /// Search nonces on every core
    #[arg(long, global = true)]
    parallel: bool,

    /// What to do with an unreadable ledger file: preserve, discard or refuse
    #[arg(long, global = true, default_value_t = CorruptStorePolicy::Preserve)]
    on_corrupt: CorruptStorePolicy,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a transaction to the pending pool
    AddTransaction {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: f64,
        /// Extra fields as a JSON object, e.g. '{"memo": "rent"}'
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Mine every pending transaction into a new block
    Mine,
    /// Print the whole chain
    View,
    /// Check the chain; exits with status 1 if it is invalid
    Validate,
    /// Print the pending pool
    Pending,
    /// Adopt the longest valid chain from a JSON file of peer chains
    Resolve {
        #[arg(long)]
        file: PathBuf,
    },
}

impl Cli {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            on_corrupt: self.on_corrupt,
            mining: MiningConfig {
                parallel: self.parallel,
                max_nonce: None,
            },
            ..LedgerConfig::new(self.difficulty, &self.storage).with_autosave(!self.no_autosave)
        }
    }
}

fn main() -> Result<ExitCode> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .pretty()
        .init();

    let cli = Cli::parse();
    let ok = run(cli, &mut std::io::stdout().lock())?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Execute one command, writing its report to `out`. Returns `false` when
/// the command ran but found a problem.
fn run(cli: Cli, out: &mut impl Write) -> Result<bool> {
    let config = cli.ledger_config();
    let store = Arc::new(JsonFileStore::new(&config.storage_path));
    let (mut ledger, startup) = Ledger::open(store, config)?;
    if let Startup::Recovered {
        reason,
        preserved_at: Some(path),
    } = &startup
    {
        writeln!(out, "Warning: {reason}; previous file kept at {}", path.display())?;
    }

    match cli.cmd {
        Command::AddTransaction {
            sender,
            recipient,
            amount,
            metadata,
        } => {
            let mut tx = Transaction::with_f64_amount(sender, recipient, amount)?;
            if let Some(raw) = metadata {
                let Value::Object(fields) =
                    serde_json::from_str::<Value>(&raw).context("metadata must be valid JSON")?
                else {
                    bail!("metadata must be a JSON object");
                };
                for (key, value) in fields {
                    tx = tx.with_meta(key, value);
                }
            }
            ledger.admit_transaction(tx)?;
            writeln!(out, "Transaction added successfully.")?;
        }
        Command::Mine => {
            let block = ledger.mine()?;
            writeln!(
                out,
                "Block mined! Index: {}, Hash: {}, Transactions: {}",
                block.index,
                block.hash,
                block.transactions.len()
            )?;
        }
        Command::View => {
            for block in ledger.chain() {
                writeln!(out, "Block {}:", block.index)?;
                writeln!(out, "  Timestamp: {}", block.timestamp)?;
                writeln!(out, "  Previous Hash: {}", block.previous_hash)?;
                writeln!(out, "  Hash: {}", block.hash)?;
                writeln!(out, "  Nonce: {}", block.nonce)?;
                writeln!(out, "  Transactions ({}):", block.transactions.len())?;
                for tx in &block.transactions {
                    writeln!(out, "    {}", serde_json::to_string(tx)?)?;
                }
                writeln!(out)?;
            }
        }
        Command::Validate => match ledger.validation_report() {
            Ok(()) => writeln!(out, "Blockchain is valid.")?,
            Err(e) => {
                writeln!(out, "Blockchain is INVALID: {e}")?;
                return Ok(false);
            }
        },
        Command::Pending => {
            let pending = ledger.pending();
            if pending.is_empty() {
                writeln!(out, "No pending transactions.")?;
            } else {
                writeln!(out, "Pending transactions ({}):", pending.len())?;
                for tx in pending {
                    writeln!(out, "  {}", serde_json::to_string(tx)?)?;
                }
            }
        }
        Command::Resolve { file } => {
            let candidates = read_candidates(&file)?;
            if ledger.resolve(candidates)? {
                writeln!(out, "Chain was replaced with a longer valid chain.")?;
            } else {
                writeln!(out, "Current chain is authoritative; no replacement occurred.")?;
            }
        }
    }
    Ok(true)
}

/// A peer file is a JSON array of chains; entries that are not arrays are
/// left out.
fn read_candidates(file: &Path) -> Result<Vec<Vec<Value>>> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read peer chains from {}", file.display()))?;
    let Value::Array(chains) = serde_json::from_str::<Value>(&raw)
        .with_context(|| format!("{} is not valid JSON", file.display()))?
    else {
        bail!("{} must hold a JSON array of chains", file.display());
    };
    Ok(chains
        .into_iter()
        .filter_map(|chain| match chain {
            Value::Array(blocks) => Some(blocks),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn exec(dir: &TempDir, args: &[&str]) -> Result<(bool, String)> {
        let storage = dir.path().join("blockchain.json");
        let mut argv = vec![
            "ledger-cli".to_string(),
            "--storage".to_string(),
            storage.display().to_string(),
            "--difficulty".to_string(),
            "1".to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        let cli = Cli::try_parse_from(argv)?;
        let mut out = Vec::new();
        let ok = run(cli, &mut out)?;
        Ok((ok, String::from_utf8(out)?))
    }

    #[test]
    fn add_mine_view_validate() -> Result<()> {
        let dir = tempdir()?;
        let (_, out) = exec(
            &dir,
            &[
                "add-transaction",
                "--sender",
                "Alice",
                "--recipient",
                "Bob",
                "--amount",
                "5",
                "--metadata",
                r#"{"memo": "lunch", "amount": 999}"#,
            ],
        )?;
        assert_eq!(out, "Transaction added successfully.\n");

        let (_, out) = exec(&dir, &["pending"])?;
        assert!(out.starts_with("Pending transactions (1):"));
        assert!(out.contains(r#""memo":"lunch""#));
        assert!(out.contains(r#""amount":5.0"#));

        let (_, out) = exec(&dir, &["mine"])?;
        assert!(out.starts_with("Block mined! Index: 1, Hash: 0"));

        let (_, out) = exec(&dir, &["pending"])?;
        assert_eq!(out, "No pending transactions.\n");

        let (_, out) = exec(&dir, &["view"])?;
        assert!(out.contains("Block 0:"));
        assert!(out.contains("Transactions (1):"));

        let (ok, out) = exec(&dir, &["validate"])?;
        assert!(ok);
        assert_eq!(out, "Blockchain is valid.\n");
        Ok(())
    }

    #[test]
    fn bad_input_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let args = ["add-transaction", "--sender", "A", "--recipient", "B", "--amount=-1"];
        assert!(exec(&dir, &args).is_err());
        let args = ["add-transaction", "--sender", "A", "--recipient", "B", "--amount", "1", "--metadata", "[1]"];
        assert!(exec(&dir, &args).is_err());
        assert!(exec(&dir, &["mine"]).is_err());
        Ok(())
    }

    #[test]
    fn no_autosave_leaves_file_alone() -> Result<()> {
        let dir = tempdir()?;
        exec(&dir, &["--no-autosave", "view"])?;
        assert!(!dir.path().join("blockchain.json").exists());
        Ok(())
    }

    #[test]
    fn no_autosave_keeps_a_corrupt_file_in_place() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("blockchain.json");
        fs::write(&path, "{\"chain\": [")?;
        let (ok, out) = exec(&dir, &["--no-autosave", "view"])?;
        assert!(ok);
        assert!(out.contains("Block 0:"));
        assert_eq!(fs::read_to_string(&path)?, "{\"chain\": [");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn tampered_file_fails_validation_on_refuse() -> Result<()> {
        let dir = tempdir()?;
        exec(&dir, &["add-transaction", "--sender", "A", "--recipient", "B", "--amount", "1"])?;
        exec(&dir, &["mine"])?;
        let path = dir.path().join("blockchain.json");
        let text = fs::read_to_string(&path)?.replacen("\"amount\": 1.0", "\"amount\": 999.0", 1);
        fs::write(&path, text)?;
        assert!(exec(&dir, &["--on-corrupt", "refuse", "validate"]).is_err());
        Ok(())
    }

    #[test]
    fn resolve_from_peer_file() -> Result<()> {
        let peer_dir = tempdir()?;
        exec(&peer_dir, &["add-transaction", "--sender", "P", "--recipient", "Q", "--amount", "2"])?;
        exec(&peer_dir, &["mine"])?;
        let doc: Value = serde_json::from_str(&fs::read_to_string(peer_dir.path().join("blockchain.json"))?)?;
        let peers = dir_file(&peer_dir, "peers.json", &Value::Array(vec![Value::from("junk"), doc["chain"].clone()]))?;

        let dir = tempdir()?;
        let (_, out) = exec(&dir, &["resolve", "--file", &peers])?;
        assert_eq!(out, "Chain was replaced with a longer valid chain.\n");
        let (_, out) = exec(&dir, &["resolve", "--file", &peers])?;
        assert_eq!(out, "Current chain is authoritative; no replacement occurred.\n");

        let not_a_list = dir_file(&dir, "bad.json", &serde_json::json!({"chain": []}))?;
        assert!(exec(&dir, &["resolve", "--file", &not_a_list]).is_err());
        Ok(())
    }

    fn dir_file(dir: &TempDir, name: &str, value: &Value) -> Result<String> {
        let path = dir.path().join(name);
        fs::write(&path, serde_json::to_vec(value)?)?;
        Ok(path.display().to_string())
    }
}
