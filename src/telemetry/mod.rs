//! Tracing bootstrap for binaries and tests embedding the interpreter.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber once. `RUST_LOG` (optionally via a
/// `.env` file) controls the filter; defaults to `info`.
pub fn init() {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
