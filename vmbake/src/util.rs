use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::constants::{defaults, filenames};

/// Initialize tracing with file logging.
///
/// Logs are written to `{logs_dir}/vmbake.log` with daily rotation. The
/// filter comes from `RUST_LOG`, falling back to `default_filter`.
/// Returns a WorkerGuard that must be kept alive to maintain the background
/// writer thread.
pub fn init_logging(logs_dir: &Path, default_filter: Option<&str>) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, filenames::LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter.unwrap_or(defaults::LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(defaults::LOG_FILTER));

    register_to_tracing(non_blocking, env_filter);

    Ok(guard)
}

pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}
