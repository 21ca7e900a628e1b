use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ledger_core::{LedgerError, MineError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    BadRequest(String),
    #[error("ledger lock poisoned by an earlier panic")]
    Poisoned,
    #[error("ledger task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// `Json` whose rejections come back as `{"error": ..}` like every other
/// failure.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::Ledger(LedgerError::Validation(_))
            | ApiError::Ledger(LedgerError::EmptyPool) => StatusCode::BAD_REQUEST,
            // A retry builds a new candidate, so both may succeed later.
            ApiError::Ledger(LedgerError::Mining(MineError::Cancelled))
            | ApiError::Ledger(LedgerError::Mining(MineError::Exhausted { .. })) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        } else {
            debug!("request rejected: {self}");
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}
