use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::{FleetApi, RpcCall};
use crate::config::SyncConfig;
use crate::error::ApiError;

/// Outcome of one batched run. A failed batch drops only its own
/// contribution; `items` still holds every other batch's results.
#[derive(Debug, Default)]
pub struct BatchRun {
    /// Singleton results of the successful operations, in submission
    /// order.
    pub items: Vec<Value>,
    pub failed_batches: usize,
    pub total_batches: usize,
    pub cancelled: bool,
}

/// Executes point fetches as sequential fixed-size multi-call batches.
///
/// One batch is in flight at a time; sequential pacing with the
/// inter-batch delay is what keeps sustained throughput under the
/// server's calls-per-minute ceiling. Rate-limited batches are retried
/// with the server-suggested wait; a batch that exhausts its retries is
/// counted as failed and the run continues.
pub struct RateLimitedBatcher {
    batch_size: usize,
    inter_batch_delay: Duration,
    max_retries: u32,
    backoff_floor: Duration,
    backoff_margin: Duration,
}

impl RateLimitedBatcher {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            inter_batch_delay: config.inter_batch_delay,
            max_retries: config.max_retries,
            backoff_floor: config.backoff_floor,
            backoff_margin: config.backoff_margin,
        }
    }

    /// Run `calls` to completion, invoking `on_batch_done(completed,
    /// total)` after every batch, successful or not. Cancellation is
    /// checked before every delay and every dispatch; once signalled the
    /// collected results so far are returned.
    pub async fn run<F>(
        &self,
        api: &dyn FleetApi,
        calls: Vec<RpcCall>,
        cancel: &CancellationToken,
        mut on_batch_done: F,
    ) -> BatchRun
    where
        F: FnMut(usize, usize),
    {
        let batches: Vec<&[RpcCall]> = calls.chunks(self.batch_size).collect();
        let mut run = BatchRun {
            total_batches: batches.len(),
            ..BatchRun::default()
        };

        for (idx, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                run.cancelled = true;
                return run;
            }
            if idx > 0 && !self.pause(self.inter_batch_delay, cancel).await {
                run.cancelled = true;
                return run;
            }

            match self.dispatch_with_retry(api, batch, cancel).await {
                BatchAttempt::Success(results) => {
                    // Every operation is a point Get expecting a
                    // singleton list; anything else is skipped.
                    run.items
                        .extend(results.into_iter().filter_map(singleton));
                }
                BatchAttempt::Failed => {
                    run.failed_batches += 1;
                }
                BatchAttempt::Cancelled => {
                    run.cancelled = true;
                    return run;
                }
            }

            on_batch_done(idx + 1, run.total_batches);
        }

        if run.failed_batches > 0 {
            tracing::warn!(
                "{} of {} batches failed",
                run.failed_batches,
                run.total_batches
            );
        }
        run
    }

    async fn dispatch_with_retry(
        &self,
        api: &dyn FleetApi,
        batch: &[RpcCall],
        cancel: &CancellationToken,
    ) -> BatchAttempt {
        let mut retries_left = self.max_retries;
        loop {
            if cancel.is_cancelled() {
                return BatchAttempt::Cancelled;
            }
            match api.multi_call(batch).await {
                Ok(results) => return BatchAttempt::Success(results),
                Err(ApiError::OverLimit { retry_after }) if retries_left > 0 => {
                    let wait = retry_after.unwrap_or(self.backoff_floor).max(self.backoff_floor)
                        + self.backoff_margin;
                    tracing::warn!(
                        wait_ms = wait.as_millis() as u64,
                        retries_left,
                        "Rate limited, backing off before retry"
                    );
                    retries_left -= 1;
                    if !self.pause(wait, cancel).await {
                        return BatchAttempt::Cancelled;
                    }
                }
                Err(e) => {
                    tracing::warn!("Batch failed, skipping: {}", e);
                    return BatchAttempt::Failed;
                }
            }
        }
    }

    /// Sleep, returning false if cancellation fired first.
    async fn pause(&self, wait: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

enum BatchAttempt {
    Success(Vec<Value>),
    Failed,
    Cancelled,
}

/// First element of a non-empty array result, otherwise nothing.
fn singleton(value: Value) -> Option<Value> {
    match value {
        Value::Array(mut items) if !items.is_empty() => Some(items.remove(0)),
        _ => None,
    }
}
