//! Terminal status messages.
//!
//! Thin wrappers over `console` styling with graceful degradation when
//! colors are unavailable (CI, piped output, `NO_COLOR`).

use console::style;

pub fn info(message: &str) {
    println!("{} {message}", style("info").cyan().bold());
}

pub fn success(message: &str) {
    println!("{} {message}", style("ready").green().bold());
}

pub fn warning(message: &str) {
    eprintln!("{} {message}", style("warn").yellow().bold());
}

pub fn error(message: &str) {
    eprintln!("{} {message}", style("error").red().bold());
}

/// Human-readable byte size, used by the `--analyze` report.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f >= MIB {
        format!("{:.2} MiB", bytes_f / MIB)
    } else if bytes_f >= KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// Human-readable duration for build summaries.
pub fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}
