pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod models;
pub mod sync;

pub use config::{Config, SyncConfig};
pub use context::{SessionContext, VehicleFilter, VehicleSelection};
pub use error::{ApiError, SyncError, SyncWarning};
pub use sync::{DateRange, RangePreset, SyncEvent, SyncManager, SyncOutcome, SyncPhase};
