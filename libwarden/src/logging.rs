use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber for Warden.
///
/// Reads `RUST_LOG` for filtering and falls back to `default_level`
/// (usually `info`). Output goes to *stderr* so that event output printed
/// by the CLI on stdout stays machine-readable.
///
/// Returns `false` when a subscriber was already installed (tests and
/// embedding applications may call this more than once).
pub fn init_with_default(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Initialise logging with the `info` default.
pub fn init() -> bool {
    init_with_default("info")
}
