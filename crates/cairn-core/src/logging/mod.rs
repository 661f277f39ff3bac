//! Structured logging setup.
//!
//! Cairn logs through the `tracing` ecosystem. Library crates only emit
//! events; binaries call [`init_subscriber`] once at startup.
//!
//! `RUST_LOG` takes precedence over the configured level so a single run can
//! be made verbose without editing settings.

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum level or filter directive (e.g. `"info"`,
///   `"cairn_sync=debug,warn"`).
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default fails if already set; that is fine
    let _ = subscriber.try_init();
}

/// Initialize a JSON-formatted subscriber on stderr.
///
/// Used when the host application collects logs as structured records.
pub fn init_json_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
