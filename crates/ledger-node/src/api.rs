use crate::{
    constants::{MAX_BODY_BYTES, MAX_CANDIDATES_PER_REQUEST},
    error::{ApiError, ApiJson},
};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ledger_core::{Block, CancelToken, Ledger, LedgerError, Transaction};
use ledger_storage::JsonFileStore;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub type NodeLedger = Ledger<JsonFileStore>;

/// One ledger shared by every request. Work on it runs on the blocking
/// pool so a long mining run never stalls the async workers.
#[derive(Clone)]
pub struct AppState {
    ledger: Arc<Mutex<NodeLedger>>,
    cancel: CancelToken,
}

impl AppState {
    pub fn new(ledger: NodeLedger) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            cancel: CancelToken::new(),
        }
    }

    /// Cancelling this aborts the mining run in flight and every later one.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut NodeLedger) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || {
            let mut guard = ledger.lock().map_err(|_| ApiError::Poisoned)?;
            f(&mut guard).map_err(ApiError::from)
        })
        .await?
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Summary {
    chain_length: usize,
    difficulty: usize,
    pending: usize,
    tip_hash: Option<String>,
    tx_counts: Vec<usize>,
}

#[derive(Serialize)]
struct ChainView {
    length: usize,
    chain: Vec<Block>,
}

#[derive(Serialize)]
struct PendingView {
    count: usize,
    pending_transactions: Vec<Transaction>,
}

#[derive(Serialize)]
struct Admitted {
    message: &'static str,
    pending: usize,
}

#[derive(Serialize)]
struct Mined {
    message: &'static str,
    block: Block,
}

#[derive(Serialize)]
struct Validity {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct Resolved {
    replaced: bool,
    length: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(summary))
        .route("/health", get(health))
        .route("/chain", get(chain))
        .route("/pending", get(pending))
        .route("/transactions/new", post(new_transaction))
        .route("/mine", post(mine))
        .route("/validate", get(validate))
        .route("/resolve", post(resolve))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn summary(State(state): State<AppState>) -> Result<Json<Summary>, ApiError> {
    let summary = state
        .run(|ledger| {
            Ok(Summary {
                chain_length: ledger.chain().len(),
                difficulty: ledger.config().difficulty,
                pending: ledger.pending().len(),
                tip_hash: ledger.tip().map(|b| b.hash.clone()),
                tx_counts: ledger.chain().iter().map(|b| b.transactions.len()).collect(),
            })
        })
        .await?;
    Ok(Json(summary))
}

async fn chain(State(state): State<AppState>) -> Result<Json<ChainView>, ApiError> {
    let chain = state.run(|ledger| Ok(ledger.chain().to_vec())).await?;
    Ok(Json(ChainView {
        length: chain.len(),
        chain,
    }))
}

async fn pending(State(state): State<AppState>) -> Result<Json<PendingView>, ApiError> {
    let pending = state.run(|ledger| Ok(ledger.pending().to_vec())).await?;
    Ok(Json(PendingView {
        count: pending.len(),
        pending_transactions: pending,
    }))
}

async fn new_transaction(
    State(state): State<AppState>,
    ApiJson(record): ApiJson<Value>,
) -> Result<(StatusCode, Json<Admitted>), ApiError> {
    let pending = state
        .run(move |ledger| {
            ledger.admit_record(record)?;
            Ok(ledger.pending().len())
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Admitted {
            message: "transaction added",
            pending,
        }),
    ))
}

async fn mine(State(state): State<AppState>) -> Result<Json<Mined>, ApiError> {
    let cancel = state.cancel.clone();
    let block = state.run(move |ledger| ledger.mine_with_cancel(&cancel)).await?;
    Ok(Json(Mined {
        message: "block mined",
        block,
    }))
}

async fn validate(State(state): State<AppState>) -> Result<Json<Validity>, ApiError> {
    let report = state.run(|ledger| Ok(ledger.validation_report())).await?;
    Ok(Json(Validity {
        valid: report.is_ok(),
        error: report.err().map(|e| e.to_string()),
    }))
}

/// Body: an array of candidate chains, each an array of block records.
async fn resolve(
    State(state): State<AppState>,
    ApiJson(candidates): ApiJson<Vec<Value>>,
) -> Result<Json<Resolved>, ApiError> {
    if candidates.len() > MAX_CANDIDATES_PER_REQUEST {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_CANDIDATES_PER_REQUEST} candidate chains per request, got {}",
            candidates.len()
        )));
    }
    let chains: Vec<Vec<Value>> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, candidate)| match candidate {
            Value::Array(blocks) => Some(blocks),
            _ => {
                debug!("candidate {i}: not an array of blocks, skipped");
                None
            }
        })
        .collect();

    let (replaced, length) = state
        .run(move |ledger| {
            let replaced = ledger.resolve(chains)?;
            Ok((replaced, ledger.chain().len()))
        })
        .await?;
    Ok(Json(Resolved { replaced, length }))
}
