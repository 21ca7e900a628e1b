use clap::Parser;
use ledger_core::{
    constants::{DEFAULT_DIFFICULTY, DEFAULT_STORAGE_FILE},
    CancelToken, CorruptStorePolicy, Ledger, LedgerConfig, MiningConfig, Startup,
};
use ledger_node::{constants::DEFAULT_LISTEN_ADDR, router, AppState};
use ledger_storage::JsonFileStore;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "ledger-node")]
#[command(about = "HTTP service for a proof-of-work ledger file")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// Ledger file
    #[arg(long, default_value = DEFAULT_STORAGE_FILE)]
    storage: PathBuf,

    /// Leading zero hex digits every block hash must carry
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Search nonces on every core
    #[arg(long)]
    parallel: bool,

    /// Give up on a block after trying this many nonces
    #[arg(long)]
    max_nonce: Option<u64>,

    /// What to do with an unreadable ledger file: preserve, discard or refuse
    #[arg(long, default_value_t = CorruptStorePolicy::Preserve)]
    on_corrupt: CorruptStorePolicy,
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            on_corrupt: self.on_corrupt,
            mining: MiningConfig {
                parallel: self.parallel,
                max_nonce: self.max_nonce,
            },
            ..LedgerConfig::new(self.difficulty, &self.storage)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.ledger_config();
    let store = Arc::new(JsonFileStore::new(&config.storage_path));
    let (ledger, startup) = tokio::task::spawn_blocking(move || Ledger::open(store, config)).await??;

    match &startup {
        Startup::Restored => info!("loaded {} blocks from {}", ledger.chain().len(), args.storage.display()),
        Startup::Genesis => info!("started a new chain in {}", args.storage.display()),
        Startup::Recovered {
            reason,
            preserved_at,
        } => match preserved_at {
            Some(path) => warn!("started a new chain ({reason}); old file kept at {}", path.display()),
            None => warn!("started a new chain ({reason}); old file overwritten"),
        },
    }

    let state = AppState::new(ledger);
    let cancel = state.cancel_token().clone();
    let app = router(state);

    info!("ledger-node listening on http://{}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;
    Ok(())
}

async fn shutdown_signal(cancel: CancelToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    cancel.cancel();
}
