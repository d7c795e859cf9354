//! Logging Infrastructure
//!
//! `EnvFilter` driven subscriber. Text output for development, JSON when
//! `LOG_JSON` is set, and a daily rolling file when `LOG_DIR` points at a
//! directory.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is not set
fn default_directives(level: &str) -> String {
    format!("catering_server={level},tower_http={level},sqlx=warn")
}

/// Initialize the global subscriber
///
/// The returned guard must be kept alive for file output to be flushed.
pub fn init_logger(
    log_level: &str,
    json: bool,
    log_dir: Option<&str>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.is_dir() {
            let file_appender = tracing_appender::rolling::daily(log_path, "catering-server");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let builder = builder.with_writer(writer).with_ansi(false);
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
            return Some(guard);
        }
        eprintln!("LOG_DIR {dir} is not a directory, logging to stdout");
    }

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    None
}
