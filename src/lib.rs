pub mod api;
pub mod config;
pub mod error;
pub mod store;
pub mod sync;

use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG`-driven subscriber shared by every binary, `info` by default.
pub fn init_tracing() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
