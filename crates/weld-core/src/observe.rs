//! Tracing setup for embedding tools.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize a global tracing subscriber honoring `WELD_LOG`.
///
/// Falls back to `warn` when the variable is unset or malformed. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("WELD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
