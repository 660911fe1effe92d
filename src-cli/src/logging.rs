//! Log setup: stderr for the terminal, a daily file in the log directory.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use ajamedia_common::logging::{ensure_log_dir, LOG_FILE_PREFIX};

/// Install the global subscriber.
///
/// The terminal gets warnings only (debug with `verbose`, nothing with
/// `quiet`) unless RUST_LOG says otherwise; the file always gets info.
/// Keep the returned guard alive until exit so file logs are flushed.
pub fn init(verbose: bool, quiet: bool) -> Option<WorkerGuard> {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "off"
    } else {
        "warn"
    };
    let terminal_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let terminal = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_filter(terminal_filter);

    let (file, guard) = match ensure_log_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("info"));
            (Some(layer), Some(guard))
        }
        Err(e) => {
            if !quiet {
                eprintln!("Failed to create log directory: {}", e);
            }
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(terminal)
        .with(file)
        .init();
    guard
}
