use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const DEFAULT_FILTER: &str = "info,vidtax=debug,hyper_util=error,reqwest=warn";

pub struct LoggingGuards {
    /// Flushes the file log on drop; keep alive for the life of the process.
    pub file: WorkerGuard,
}

/// Install the global subscriber: a daily rolling file under `log_dir` plus
/// compact stderr output. `RUST_LOG` overrides [`DEFAULT_FILTER`].
pub fn init_tracing(log_dir: &Path) -> std::io::Result<LoggingGuards> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "vidtax.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .with_writer(non_blocking_file);

    let console_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    Ok(LoggingGuards { file: file_guard })
}
