//! Logging for tests.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
///
/// The workspace crates log at full verbosity. Latency records are muted because every store call
/// emits one and they would drown the diagnostics.
const DEFAULT_FILTER: &str = "warn,docbench=trace,docbench_store=trace,docbench::latency=off";

/// Installs a subscriber writing through the test harness, so output is only shown for failing
/// tests.
///
/// `RUST_LOG` replaces the default filter, e.g. `RUST_LOG=docbench::latency=info` to see the
/// latency records. Calling this more than once is harmless.
///
/// # Example
///
/// ```
/// docbench_test::tracing::init();
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init()
        .ok();
}
