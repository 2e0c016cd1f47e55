// Tracing initialization with a configurable log level.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Level used when neither RUST_LOG, config nor -v say otherwise.
pub const DEFAULT_LEVEL: &str = "warn";

/// Maps the -v count onto a level, falling back to `configured`.
pub fn level_for(verbose: u8, configured: Option<&str>) -> &str {
    match verbose {
        0 => configured.unwrap_or(DEFAULT_LEVEL),
        1 => "debug",
        _ => "trace",
    }
}

pub fn init_tracing_with_level(level: &str) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    // Logs go to stderr so command output stays machine-readable.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
