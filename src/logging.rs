use tracing_subscriber::{fmt, EnvFilter};

/// Install the tracing subscriber for binaries and tests.
///
/// Honors `RUST_LOG`; defaults to `info`. Safe to call more than once
/// (later calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
