// tests/common/mod.rs
// ============================================================================
// Shared test-only logging init, so integration test output carries the same
// structured `tracing` spans the pipeline emits at runtime.
// ============================================================================

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Installs a `tracing` subscriber that writes to the test harness's
/// captured output, filtered by `RUST_LOG` (defaulting to `info`).
pub fn init_test_logging() {
    let _ = fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
