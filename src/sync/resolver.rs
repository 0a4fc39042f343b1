use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::api::{FleetApi, RpcCall};
use crate::context::{parse_entities, SessionContext};
use crate::models::DriverIdentity;

use super::batcher::RateLimitedBatcher;

/// Outcome of one resolution pass.
#[derive(Debug, Default)]
pub struct ResolveStats {
    /// Identifiers actually fetched (after dedup against the cache).
    pub fetched: usize,
    pub failed_batches: usize,
    pub cancelled: bool,
}

/// Batch-resolves `User` identities into the session driver cache.
///
/// Identifiers already cached, or repeated within one call, are skipped;
/// an empty remainder resolves without touching the remote surface.
pub struct DriverResolver<'a> {
    api: &'a dyn FleetApi,
    batcher: &'a RateLimitedBatcher,
}

impl<'a> DriverResolver<'a> {
    pub fn new(api: &'a dyn FleetApi, batcher: &'a RateLimitedBatcher) -> Self {
        Self { api, batcher }
    }

    pub async fn resolve<I>(
        &self,
        ctx: &SessionContext,
        ids: I,
        cancel: &CancellationToken,
    ) -> ResolveStats
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let pending: Vec<String> = ids
            .into_iter()
            .filter(|id| !id.is_empty() && seen.insert(id.clone()) && !ctx.has_driver(id))
            .collect();

        if pending.is_empty() {
            return ResolveStats::default();
        }

        tracing::debug!(count = pending.len(), "Resolving driver identities");
        let calls: Vec<RpcCall> = pending
            .iter()
            .map(|id| RpcCall::get_by_id("User", id))
            .collect();

        let run = self.batcher.run(self.api, calls, cancel, |_, _| {}).await;

        let drivers = parse_entities::<DriverIdentity>(run.items, "User");
        let fetched = drivers.len();
        for driver in drivers {
            ctx.insert_driver(driver);
        }

        ResolveStats {
            fetched,
            failed_batches: run.failed_batches,
            cancelled: run.cancelled,
        }
    }
}
