//! HTTP front end for a single ledger file.

pub mod api;
pub mod constants;
pub mod error;

pub use api::{router, AppState, NodeLedger};
pub use error::{ApiError, ApiJson};
