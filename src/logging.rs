//! Tracing subscriber setup for the discovery binary.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Install the global tracing subscriber.
///
/// Defaults to INFO, overridable through `RUST_LOG`. Logs go to stderr so
/// the JSON report on stdout stays machine-readable.
pub fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
