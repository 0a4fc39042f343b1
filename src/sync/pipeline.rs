use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Duration as ChronoDuration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{FleetApi, RpcCall};
use crate::config::SyncConfig;
use crate::context::{parse_entities, SessionContext, VehicleFilter, VehicleSelection};
use crate::error::{SyncError, SyncWarning};
use crate::models::{InspectionRecord, UserRef, UNKNOWN_DRIVER_ID};

use super::aggregate;
use super::batcher::RateLimitedBatcher;
use super::chunker::{chunk_range, DateRange};
use super::resolver::DriverResolver;
use super::{PartialResult, SyncEvent, SyncOutcome, SyncPhase};

/// Share of overall progress allotted to the stub-fetch phase; detail
/// enrichment occupies the rest.
const STUB_PHASE_SHARE: f64 = 30.0;

/// Owns the cancellation-token lifecycle and spawns pipeline runs.
///
/// Only one run is ever active: starting a new run cancels the
/// superseded one before its replacement begins, and tearing the
/// manager down cancels whatever is in flight.
pub struct SyncManager {
    api: Arc<dyn FleetApi>,
    ctx: Arc<SessionContext>,
    config: SyncConfig,
    active: Mutex<Option<CancellationToken>>,
}

/// Handle for one in-flight run.
pub struct SyncHandle {
    token: CancellationToken,
    pub events: UnboundedReceiver<SyncEvent>,
    pub task: JoinHandle<()>,
}

impl SyncHandle {
    /// Idempotent; safe to call after the run has already finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl SyncManager {
    pub fn new(api: Arc<dyn FleetApi>, ctx: Arc<SessionContext>, config: SyncConfig) -> Self {
        Self {
            api,
            ctx,
            config,
            active: Mutex::new(None),
        }
    }

    /// Start a run over `range`, superseding any run still in flight.
    pub fn start(&self, range: DateRange, selection: &VehicleSelection) -> SyncHandle {
        let token = CancellationToken::new();
        {
            let mut active = self.active.lock().expect("active token lock");
            if let Some(previous) = active.replace(token.clone()) {
                previous.cancel();
            }
        }

        let filter = self.ctx.filter_for(selection);
        let (tx, rx) = mpsc::unbounded_channel();
        let api = Arc::clone(&self.api);
        let ctx = Arc::clone(&self.ctx);
        let config = self.config.clone();
        let run_token = token.clone();

        let task = tokio::spawn(async move {
            run(api, ctx, config, range, filter, run_token, tx).await;
        });

        SyncHandle {
            token,
            events: rx,
            task,
        }
    }

    /// Cancel the active run, if any.
    pub fn cancel_active(&self) {
        if let Some(token) = self.active.lock().expect("active token lock").take() {
            token.cancel();
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

/// Drive one synchronization run through its phases, emitting progress,
/// exactly one `Partial`, and exactly one terminal event.
async fn run(
    api: Arc<dyn FleetApi>,
    ctx: Arc<SessionContext>,
    config: SyncConfig,
    range: DateRange,
    filter: VehicleFilter,
    cancel: CancellationToken,
    tx: UnboundedSender<SyncEvent>,
) {
    let emit = |event: SyncEvent| {
        let _ = tx.send(event);
    };

    // Phase 1: fetch stubs chunk by chunk. A failure here happens
    // before any usable partial result exists and terminates the run.
    let stubs = match fetch_stubs(api.as_ref(), &config, range, &cancel, &emit).await {
        Ok(Some(stubs)) => stubs,
        Ok(None) => {
            emit(SyncEvent::Cancelled);
            return;
        }
        Err(e) => {
            tracing::error!("Stub fetch failed: {}", e);
            emit(SyncEvent::Failed(e));
            return;
        }
    };
    tracing::info!(stubs = stubs.len(), "Stub fetch complete");

    // Phase 2: resolve drivers referenced by the stubs, then emit the
    // first-pass summary (defect counts still zero).
    emit(SyncEvent::Progress {
        phase: SyncPhase::ResolvingEarlyDrivers,
        percent: STUB_PHASE_SHARE as u8,
    });
    let batcher = RateLimitedBatcher::new(&config);
    let resolver = DriverResolver::new(api.as_ref(), &batcher);

    let driver_ids = stubs.iter().filter_map(|s| {
        s.driver_id()
            .filter(|id| *id != UNKNOWN_DRIVER_ID)
            .map(str::to_string)
    });
    let stats = resolver.resolve(&ctx, driver_ids, &cancel).await;
    if stats.cancelled || cancel.is_cancelled() {
        emit(SyncEvent::Cancelled);
        return;
    }
    let mut driver_failed_batches = stats.failed_batches;

    let early_summary = aggregate::summarize(&stubs, &ctx, &filter);
    emit(SyncEvent::Partial(PartialResult {
        kpis: aggregate::kpis(&early_summary),
        summary: early_summary,
    }));

    if stubs.is_empty() {
        emit(SyncEvent::Completed(SyncOutcome {
            records: Vec::new(),
            summary: Vec::new(),
            detail: Vec::new(),
            kpis: Default::default(),
            warnings: Vec::new(),
        }));
        return;
    }

    // Phase 3: re-fetch each stub's full record. Failures from here on
    // are batch-local and degrade to a warning on the outcome.
    let calls: Vec<RpcCall> = stubs
        .iter()
        .map(|s| RpcCall::get_by_id("DVIRLog", &s.id))
        .collect();
    let enrich_tx = tx.clone();
    let run_result = batcher
        .run(api.as_ref(), calls, &cancel, move |done, total| {
            let _ = enrich_tx.send(SyncEvent::Progress {
                phase: SyncPhase::EnrichingDetail,
                percent: enrich_percent(done, total),
            });
        })
        .await;
    if run_result.cancelled || cancel.is_cancelled() {
        emit(SyncEvent::Cancelled);
        return;
    }

    let records = merge_enriched(stubs, parse_entities(run_result.items, "DVIRLog"));
    tracing::info!(
        records = records.len(),
        with_defects = records.iter().filter(|r| !r.defects().is_empty()).count(),
        "Detail enrichment complete"
    );

    // Phase 4: repair performers only appear once detail is loaded.
    emit(SyncEvent::Progress {
        phase: SyncPhase::ResolvingLateDrivers,
        percent: 100,
    });
    let repair_user_ids = records.iter().flat_map(|record| {
        record.defects().iter().filter_map(|defect| {
            match defect.repair_user.as_ref() {
                Some(UserRef::Ref(r)) => r.id.clone(),
                _ => None,
            }
        })
    });
    let ids: Vec<String> = repair_user_ids.collect();
    let stats = resolver.resolve(&ctx, ids, &cancel).await;
    if stats.cancelled || cancel.is_cancelled() {
        emit(SyncEvent::Cancelled);
        return;
    }
    driver_failed_batches += stats.failed_batches;

    // Batch-local failures survive as warnings on the outcome rather
    // than terminating the run.
    let mut warnings = Vec::new();
    if run_result.failed_batches > 0 {
        warnings.push(SyncWarning::DetailIncomplete {
            failed_batches: run_result.failed_batches,
            total_batches: run_result.total_batches,
        });
    }
    if driver_failed_batches > 0 {
        warnings.push(SyncWarning::DriversUnresolved {
            failed_batches: driver_failed_batches,
        });
    }
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    // Phase 5: final projection.
    emit(SyncEvent::Progress {
        phase: SyncPhase::Aggregating,
        percent: 100,
    });
    let summary = aggregate::summarize(&records, &ctx, &filter);
    let detail = aggregate::detail(&records, &ctx, &filter);
    let kpis = aggregate::kpis(&summary);
    emit(SyncEvent::Completed(SyncOutcome {
        records,
        summary,
        detail,
        kpis,
        warnings,
    }));
}

/// Phase 1: chunked, sequential list queries. Returns `None` when the
/// run was cancelled mid-phase.
async fn fetch_stubs(
    api: &dyn FleetApi,
    config: &SyncConfig,
    range: DateRange,
    cancel: &CancellationToken,
    emit: &impl Fn(SyncEvent),
) -> Result<Option<Vec<InspectionRecord>>, SyncError> {
    let chunks = chunk_range(range.from, range.to, ChronoDuration::days(config.chunk_days))?;
    let total = chunks.len();
    emit(SyncEvent::Progress {
        phase: SyncPhase::FetchingStubs,
        percent: 0,
    });

    let mut raw = Vec::new();
    for (idx, chunk) in chunks.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if idx > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(config.inter_chunk_delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let result = api
            .call(&RpcCall::get_range(
                "DVIRLog",
                &chunk.from.to_rfc3339(),
                &chunk.to.to_rfc3339(),
            ))
            .await
            .map_err(SyncError::Api)?;
        if let Some(items) = result.as_array() {
            raw.extend(items.iter().cloned());
        }

        emit(SyncEvent::Progress {
            phase: SyncPhase::FetchingStubs,
            percent: stub_percent(idx + 1, total),
        });
    }

    Ok(Some(parse_entities(raw, "DVIRLog")))
}

fn stub_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return STUB_PHASE_SHARE as u8;
    }
    (done as f64 / total as f64 * STUB_PHASE_SHARE).round() as u8
}

fn enrich_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (STUB_PHASE_SHARE + done as f64 / total as f64 * (100.0 - STUB_PHASE_SHARE)).round() as u8
}

/// When some detail batches failed, keep the stub for every record whose
/// full fetch was dropped so the summary retains all records (their
/// defect counts stay at zero).
fn merge_enriched(
    stubs: Vec<InspectionRecord>,
    enriched: Vec<InspectionRecord>,
) -> Vec<InspectionRecord> {
    if enriched.len() >= stubs.len() {
        return enriched;
    }
    let have: HashSet<String> = enriched.iter().map(|r| r.id.clone()).collect();
    let mut records = enriched;
    records.extend(stubs.into_iter().filter(|s| !have.contains(&s.id)));
    records
}
