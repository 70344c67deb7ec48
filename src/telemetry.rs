//! Tracing subscriber setup for binaries embedding the engine.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to `default_directive`.
/// A second call is a no-op.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
