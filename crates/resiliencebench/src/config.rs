//! Configuration loading from environment variables.
//!
//! Uses the following environment variables:
//! - `RESILIENCEBENCH_RESULTS_DIR`: Directory for queue and item result files (default: /results)
//! - `RESILIENCEBENCH_LOAD_GENERATOR_IMAGE`: Load-generator image (default: grafana/k6:latest)
//! - `RESILIENCEBENCH_RESYNC_INTERVAL_MS`: Periodic resync of each controller (default: 60000)
//! - `RESILIENCEBENCH_ERROR_BACKOFF_MS`: Requeue delay after a failed pass (default: 5000)
//! - `RESILIENCEBENCH_UPDATE_RETRY_ATTEMPTS`: Attempts per optimistic write (default: 3)
//! - `RESILIENCEBENCH_UPDATE_RETRY_BACKOFF_MS`: Delay between write attempts (default: 1000)
//! - `RESILIENCEBENCH_JOB_DELETE_TIMEOUT_MS`: Wait for a deleted job to disappear (default: 120000)
//! - `RESILIENCEBENCH_JOB_MAX_RUNTIME_SECS`: Delete jobs running longer than this (default: unset, no limit)
//! - `RESILIENCEBENCH_MANIFEST_DIR`: JSON manifests loaded at startup (default: unset)
//! - `RESILIENCEBENCH_SIMULATED_JOB_MS`: Duration of simulated load jobs (default: 5000)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::retry::RetryConfig;

pub const DEFAULT_RESULTS_DIR: &str = "/results";
pub const DEFAULT_LOAD_GENERATOR_IMAGE: &str = "grafana/k6:latest";

/// Operator configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub results_dir: String,
    pub load_generator_image: String,
    pub resync_interval: Duration,
    pub error_backoff: Duration,
    pub update_retry: RetryConfig,
    pub job_delete_timeout: Duration,
    /// `None` lets a job run until it completes on its own.
    pub job_max_runtime: Option<Duration>,
    pub manifest_dir: Option<PathBuf>,
    pub simulated_job_duration: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            results_dir: DEFAULT_RESULTS_DIR.to_string(),
            load_generator_image: DEFAULT_LOAD_GENERATOR_IMAGE.to_string(),
            resync_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(5),
            update_retry: RetryConfig::default(),
            job_delete_timeout: Duration::from_secs(120),
            job_max_runtime: None,
            manifest_dir: None,
            simulated_job_duration: Duration::from_secs(5),
        }
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {name}: {raw:?}")),
        Err(_) => Ok(None),
    }
}

fn millis_var(name: &str, default: Duration) -> Result<Duration> {
    Ok(parse_var::<u64>(name)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}

impl OperatorConfig {
    /// Load configuration from environment variables.
    ///
    /// Loads `.env` file if present, then reads from environment. Values that
    /// are set but do not parse are an error.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let results_dir =
            env::var("RESILIENCEBENCH_RESULTS_DIR").unwrap_or(defaults.results_dir);
        let load_generator_image = env::var("RESILIENCEBENCH_LOAD_GENERATOR_IMAGE")
            .unwrap_or(defaults.load_generator_image);

        let resync_interval =
            millis_var("RESILIENCEBENCH_RESYNC_INTERVAL_MS", defaults.resync_interval)?;
        let error_backoff = millis_var("RESILIENCEBENCH_ERROR_BACKOFF_MS", defaults.error_backoff)?;

        let update_retry = RetryConfig {
            attempts: parse_var("RESILIENCEBENCH_UPDATE_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.update_retry.attempts),
            backoff: millis_var(
                "RESILIENCEBENCH_UPDATE_RETRY_BACKOFF_MS",
                defaults.update_retry.backoff,
            )?,
        };

        let job_delete_timeout = millis_var(
            "RESILIENCEBENCH_JOB_DELETE_TIMEOUT_MS",
            defaults.job_delete_timeout,
        )?;
        let job_max_runtime =
            parse_var::<u64>("RESILIENCEBENCH_JOB_MAX_RUNTIME_SECS")?.map(Duration::from_secs);

        let manifest_dir = env::var("RESILIENCEBENCH_MANIFEST_DIR")
            .ok()
            .map(PathBuf::from);
        let simulated_job_duration = millis_var(
            "RESILIENCEBENCH_SIMULATED_JOB_MS",
            defaults.simulated_job_duration,
        )?;

        Ok(Self {
            results_dir,
            load_generator_image,
            resync_interval,
            error_backoff,
            update_retry,
            job_delete_timeout,
            job_max_runtime,
            manifest_dir,
            simulated_job_duration,
        })
    }

    /// Zero backoff and short timeouts for tests.
    pub fn test_config() -> Self {
        Self {
            results_dir: "/results".to_string(),
            resync_interval: Duration::from_secs(3600),
            error_backoff: Duration::from_millis(10),
            update_retry: RetryConfig {
                attempts: 3,
                backoff: Duration::ZERO,
            },
            job_delete_timeout: Duration::from_secs(1),
            simulated_job_duration: Duration::from_millis(10),
            ..Self::default()
        }
    }
}
