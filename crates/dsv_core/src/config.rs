//! Engine configuration.
//!
//! Reads from env vars (all optional):
//!   DSV_META_INSERT_BATCH_SIZE   rows per committed batch (default: 1000)
//!   DSV_MAX_BATCH_RETRIES        retries per batch on transient failure (default: 3)
//!   DSV_RETRY_BACKOFF_MS         base backoff between retries (default: 200)
//!   DSV_JOB_RETENTION_SECS       how long finished job records are kept (default: 3600)

use std::time::Duration;

use crate::error::DsvError;

pub const DEFAULT_META_INSERT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_BATCH_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
pub const DEFAULT_JOB_RETENTION_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows written per atomic batch (mapping rows and location option rows).
    pub meta_insert_batch_size: usize,
    /// How many times one batch is retried after a transient storage failure.
    pub max_batch_retries: u32,
    /// Backoff before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Finished job records older than this are dropped on the next submit.
    pub job_retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            meta_insert_batch_size: DEFAULT_META_INSERT_BATCH_SIZE,
            max_batch_retries: DEFAULT_MAX_BATCH_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            job_retention: Duration::from_secs(DEFAULT_JOB_RETENTION_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, DsvError> {
        let defaults = Self::default();
        let config = Self {
            meta_insert_batch_size: env_parse(
                "DSV_META_INSERT_BATCH_SIZE",
                defaults.meta_insert_batch_size,
            )?,
            max_batch_retries: env_parse("DSV_MAX_BATCH_RETRIES", defaults.max_batch_retries)?,
            retry_backoff: Duration::from_millis(env_parse(
                "DSV_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )?),
            job_retention: Duration::from_secs(env_parse(
                "DSV_JOB_RETENTION_SECS",
                DEFAULT_JOB_RETENTION_SECS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.meta_insert_batch_size = size;
        self
    }

    pub fn with_retries(mut self, max_batch_retries: u32, retry_backoff: Duration) -> Self {
        self.max_batch_retries = max_batch_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }

    pub fn validate(&self) -> Result<(), DsvError> {
        if self.meta_insert_batch_size == 0 {
            return Err(DsvError::Validation(
                "meta_insert_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, DsvError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DsvError::Validation(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}
