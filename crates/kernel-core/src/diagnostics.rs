//! Ambient logging setup: a conventional `tracing_subscriber::fmt` +
//! `EnvFilter` wiring.
//!
//! The library itself only ever calls [`tracing`] macros; nothing in
//! `kernel-core` installs a subscriber implicitly. `init_tracing` is an
//! opt-in helper for binaries (the CLI demo, integration tests) that want
//! this setup without repeating it.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `tracing_subscriber::fmt` subscriber filtered by `RUST_LOG`,
/// falling back to `default_level` when the variable is unset, and bridges
/// the `log` facade into `tracing` so dependencies that still emit through
/// `log` (rather than `tracing`) show up in the same output.
///
/// Safe to call more than once; later calls are no-ops (`try_init` ignores
/// the "already set" error).
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    let _ = tracing_log::LogTracer::init();
}
