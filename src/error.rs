use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the remote RPC surface.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server rejected the call because the per-minute budget was
    /// exceeded. `retry_after` carries the server-suggested wait, when
    /// one was supplied.
    #[error("over rate limit (retry after {retry_after:?})")]
    OverLimit { retry_after: Option<Duration> },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {name}: {message}")]
    Rpc { name: String, message: String },

    #[error("Malformed API response: {0}")]
    Malformed(String),
}

/// Run-terminating errors. Batch-local failures never reach this type;
/// they are absorbed by the batcher and reported through [`SyncWarning`].
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid date range: from {from} is not before to {to}")]
    InvalidRange { from: String, to: String },

    #[error("Fetch failed: {0}")]
    Api(#[from] ApiError),
}

/// Non-fatal caveat attached to a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    /// Some detail batches exhausted their retries; the summary is valid
    /// but defect detail is incomplete.
    DetailIncomplete {
        failed_batches: usize,
        total_batches: usize,
    },

    /// Some driver-resolution batches exhausted their retries; affected
    /// rows fall back to raw driver identifiers.
    DriversUnresolved { failed_batches: usize },
}

impl std::fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncWarning::DetailIncomplete {
                failed_batches,
                total_batches,
            } => write!(
                f,
                "{} of {} detail batches failed; defect detail is incomplete",
                failed_batches, total_batches
            ),
            SyncWarning::DriversUnresolved { failed_batches } => write!(
                f,
                "{} driver-resolution batches failed; some rows show raw driver ids",
                failed_batches
            ),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
