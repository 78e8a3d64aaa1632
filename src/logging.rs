use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes logging with console and file output.
///
/// Console lines go to stderr so that `--json` output on stdout stays
/// machine-readable; a daily-rolling JSON file under logs/ keeps the full
/// history for the server.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "metabroker.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG overrides the default filter entirely when set.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metabroker=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();

    // The guard flushes buffered lines on drop; the subscriber lives for the
    // whole process, so leak it.
    std::mem::forget(guard);
}
