//! ABOUTME: Logging infrastructure and structured logging utilities
//! ABOUTME: Provides tracing initialization driven by CONDUCTOR_LOG / RUST_LOG

use tracing_subscriber::EnvFilter;

/// Initialize structured logging.
///
/// Reads `CONDUCTOR_LOG` first, falls back to `RUST_LOG`, then defaults to
/// `info`.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env("CONDUCTOR_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).try_init()?;
    Ok(())
}
