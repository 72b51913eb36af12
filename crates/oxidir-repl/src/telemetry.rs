//! Tracing subscriber setup for replica processes.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber: fmt layer filtered by
/// `RUST_LOG`. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}
