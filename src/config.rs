use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub database: String,
    pub session_id: String,
    pub user_name: String,
    pub sync: SyncConfig,
}

/// Tunables for the synchronization pipeline. The defaults pace a
/// sustained ~3000 calls/min, comfortably under the platform's 5000/min
/// ceiling.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Width of each list-query chunk.
    pub chunk_days: i64,
    /// Pause between consecutive chunk fetches.
    pub inter_chunk_delay: Duration,
    /// Number of point fetches combined into one multi-call batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub inter_batch_delay: Duration,
    /// Retries per rate-limited batch before it is counted as failed.
    pub max_retries: u32,
    /// Floor for the rate-limit backoff when the server suggests less.
    pub backoff_floor: Duration,
    /// Safety margin added on top of every backoff wait.
    pub backoff_margin: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_days: 7,
            inter_chunk_delay: Duration::from_millis(100),
            batch_size: 50,
            inter_batch_delay: Duration::from_secs(1),
            max_retries: 2,
            backoff_floor: Duration::from_secs(5),
            backoff_margin: Duration::from_millis(500),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        let sync = SyncConfig {
            chunk_days: env::var("SYNC_CHUNK_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap_or(7),
            batch_size: env::var("SYNC_BATCH_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            ..SyncConfig::default()
        };

        Ok(Config {
            api_url: env::var("GEOTAB_API_URL")?,
            database: env::var("GEOTAB_DATABASE")?,
            session_id: env::var("GEOTAB_SESSION_ID")?,
            user_name: env::var("GEOTAB_USER_NAME")?,
            sync,
        })
    }
}
