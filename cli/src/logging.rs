//! Per-role tracing setup.
//!
//! The short-lived client logs to stderr honoring `RUST_LOG`; the daemon
//! and worker roles write to their session log files through a
//! non-blocking appender whose guard must outlive the process body.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub fn init_client() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn init_role(log_file: &Path) -> WorkerGuard {
    let directory = log_file.parent().unwrap_or_else(|| Path::new("."));
    let file_name = log_file.file_name().unwrap_or_else(|| "pagetap.log".as_ref());
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}
