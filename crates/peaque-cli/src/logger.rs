//! Logging setup on the tracing ecosystem.
//!
//! Level resolution: `--verbose` wins, then `--quiet`, then `RUST_LOG`,
//! then info for the peaque crates.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber. Call once, before any logging.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new("peaque=debug,peaque_cli=debug,peaque_build=debug,peaque_transform=debug,peaque_router=debug")
    } else if quiet {
        EnvFilter::new("peaque=error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("peaque=info,peaque_cli=info,peaque_build=info,peaque_transform=info")
        })
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// True when a request above the threshold should be logged.
/// Controlled by `PEAQUE_PERF_LOG=true`.
pub fn perf_log_enabled() -> bool {
    std::env::var("PEAQUE_PERF_LOG").map(|v| v == "true").unwrap_or(false)
}

/// Per-request log threshold in milliseconds
/// (`PEAQUE_PERF_THRESHOLD_MS`, default 200).
pub fn perf_threshold_ms() -> u64 {
    std::env::var("PEAQUE_PERF_THRESHOLD_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(200)
}
