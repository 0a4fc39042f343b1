use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dvir_sync::api::GeotabClient;
use dvir_sync::config::Config;
use dvir_sync::context::{SessionContext, VehicleSelection};
use dvir_sync::export::to_delimited;
use dvir_sync::sync::{DateRange, RangePreset, SyncEvent, SyncManager};

/// One-shot consumer of the sync core: runs a single synchronization
/// over the last seven days and writes both row collections as CSV to
/// stdout.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dvir_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting DVIR sync against {}", config.api_url);

    let api = Arc::new(GeotabClient::new(&config));
    let ctx = Arc::new(
        SessionContext::bootstrap(api.as_ref())
            .await
            .context("Failed to load session context")?,
    );

    let manager = SyncManager::new(api, Arc::clone(&ctx), config.sync.clone());
    let range = DateRange::preset(RangePreset::Last7Days, Utc::now());
    let mut handle = manager.start(range, &VehicleSelection::All);

    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Progress { phase, percent } => {
                tracing::debug!(?phase, percent, "progress");
            }
            SyncEvent::Partial(partial) => {
                tracing::info!(
                    records = partial.summary.len(),
                    outstanding = partial.kpis.outstanding,
                    "First-pass summary ready, loading defect detail"
                );
            }
            SyncEvent::Completed(outcome) => {
                for warning in &outcome.warnings {
                    tracing::warn!("{}", warning);
                }
                tracing::info!(
                    records = outcome.summary.len(),
                    defects = outcome.detail.len(),
                    "Sync complete"
                );
                println!("{}", to_delimited(&outcome.summary));
                println!();
                println!("{}", to_delimited(&outcome.detail));
            }
            SyncEvent::Failed(e) => {
                return Err(e).context("Sync failed");
            }
            SyncEvent::Cancelled => {
                tracing::warn!("Sync cancelled");
                break;
            }
        }
    }

    Ok(())
}
