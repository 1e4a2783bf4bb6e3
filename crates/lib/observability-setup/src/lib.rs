//! Observability setup for managing process-global tracing state.

mod common;

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use self::common::*;

fn env_filter(options: &ObservabilityOptions) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        options
            .default_filter
            .as_deref()
            .unwrap_or(DEFAULT_FILTER)
            .into()
    })
}

/// Install the global subscriber. A second call reports and keeps the first.
pub fn init(options: ObservabilityOptions) {
    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter(&options))
        .with(fmt::layer().with_ansi(options.ansi))
        .try_init()
    {
        eprintln!("tracing init failed: {err}");
    }
}

static INIT_TEST_TRACING: Once = Once::new();

/// Test-writer subscriber, installed once per process and only when
/// `RUST_LOG` is set.
pub fn init_for_tests() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}
