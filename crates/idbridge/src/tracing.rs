//! Logging setup with segment prefixes.
//!
//! The adapter logs through `tracing`; install a subscriber here or bring
//! your own.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with the adapter's defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Segment prefixes for log lines.
pub mod prefix {
    /// Database operations prefix
    pub const DB: &str = "⊔";
    /// Database opened and ready
    pub const OPEN: &str = "✿";
    /// Database closed
    pub const CLOSE: &str = "❀";
}
