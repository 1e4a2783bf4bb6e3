//! Resilience benchmark operator - runs both controllers against an
//! in-memory cluster.
//!
//! This binary:
//! - Seeds the in-memory backend from JSON manifests
//! - Starts the benchmark and execution queue controllers
//! - Drains job completions and advances queues
//! - Simulates load jobs that finish after a fixed duration
//! - Exports result documents to disk on shutdown
//!
//! Configuration is via environment variables (see `resiliencebench::config`)
//! and the flags below, which take precedence.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use resiliencebench::manifest::load_manifests;
use resiliencebench::{Operator, OperatorConfig};
use resiliencebench_backend_memory::MemoryBackend;
use resiliencebench_observability_setup::{ObservabilityOptions, init};
use resiliencebench_result_store::{FileStore, LocalFileStore};

#[derive(Parser, Debug)]
#[command(
    name = "resiliencebench-operator",
    about = "Run resilience benchmarks one scenario at a time."
)]
struct Args {
    /// Directory of JSON manifests to load at startup.
    #[arg(long, env = "RESILIENCEBENCH_MANIFEST_DIR")]
    manifest_dir: Option<PathBuf>,

    /// Write every result document under this directory on shutdown.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Duration of simulated load jobs, in milliseconds.
    #[arg(long)]
    simulated_job_ms: Option<u64>,

    /// Disable colored log output.
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init(ObservabilityOptions {
        default_filter: None,
        ansi: !args.no_color,
    });

    let mut config = OperatorConfig::from_env()?;
    if let Some(dir) = args.manifest_dir.clone() {
        config.manifest_dir = Some(dir);
    }
    if let Some(ms) = args.simulated_job_ms {
        config.simulated_job_duration = Duration::from_millis(ms);
    }
    info!(
        results_dir = %config.results_dir,
        image = %config.load_generator_image,
        resync_interval_ms = config.resync_interval.as_millis(),
        job_max_runtime_secs = ?config.job_max_runtime.map(|limit| limit.as_secs()),
        simulated_job_ms = config.simulated_job_duration.as_millis(),
        "starting resiliencebench operator"
    );

    let backend = MemoryBackend::with_simulated_jobs(config.simulated_job_duration);
    if let Some(dir) = &config.manifest_dir {
        load_manifests(&backend, dir)
            .await
            .with_context(|| format!("failed to load manifests from {}", dir.display()))?;
    }

    // Wire shutdown coordination.
    let shutdown_token = tokio_util::sync::CancellationToken::new();
    let tasks = Operator::new(backend.clone(), config, shutdown_token.clone()).spawn();

    if let Err(err) = wait_for_shutdown().await {
        error!(error = %err, "shutdown signal listener failed");
    }
    info!("shutdown signal received");
    shutdown_token.cancel();
    tasks.join(Duration::from_secs(5)).await;

    if let Some(dir) = args.export_dir {
        export_results(&backend, LocalFileStore::with_root(dir)).await;
    }
    info!("shutdown complete");
    Ok(())
}

async fn export_results(backend: &MemoryBackend, store: LocalFileStore) {
    let files = backend.files();
    for (path, content) in &files {
        if let Err(err) = store.write(path, content, Some("application/json")).await {
            warn!(path = %path, error = %err, "failed to export result document");
        }
    }
    info!(documents = files.len(), "result documents exported");
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        let mut terminate = unix_signal(SignalKind::terminate())?;
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Ctrl+C received");
            }
            _ = terminate.recv() => {
                info!("SIGTERM received");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Ctrl+C received");
        Ok(())
    }
}
