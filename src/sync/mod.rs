pub mod aggregate;
pub mod batcher;
pub mod chunker;
pub mod classify;
pub mod pipeline;
pub mod resolver;

pub use batcher::{BatchRun, RateLimitedBatcher};
pub use chunker::{chunk_range, DateChunk, DateRange, RangePreset};
pub use pipeline::{SyncHandle, SyncManager};
pub use resolver::DriverResolver;

use crate::error::{SyncError, SyncWarning};
use crate::models::{DetailRow, InspectionRecord, KpiCounts, SummaryRow};

/// Pipeline phase, in strict execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    FetchingStubs,
    ResolvingEarlyDrivers,
    EnrichingDetail,
    ResolvingLateDrivers,
    Aggregating,
}

/// First-pass result emitted after stub resolution, before any detail
/// fetch: summary rows with defect counts at zero.
#[derive(Debug, Clone)]
pub struct PartialResult {
    pub summary: Vec<SummaryRow>,
    pub kpis: KpiCounts,
}

/// The final accumulated result of a run.
#[derive(Debug)]
pub struct SyncOutcome {
    pub records: Vec<InspectionRecord>,
    pub summary: Vec<SummaryRow>,
    pub detail: Vec<DetailRow>,
    pub kpis: KpiCounts,
    /// Non-empty when batch-local failures degraded the run: defect
    /// detail incomplete, or driver names unresolved. The summary
    /// remains valid either way.
    pub warnings: Vec<SyncWarning>,
}

/// Events emitted over the lifetime of one run: zero or more `Progress`,
/// exactly one `Partial`, then exactly one of `Completed` / `Failed` /
/// `Cancelled`.
#[derive(Debug)]
pub enum SyncEvent {
    Progress { phase: SyncPhase, percent: u8 },
    Partial(PartialResult),
    Completed(SyncOutcome),
    Failed(SyncError),
    Cancelled,
}
