use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Initialize the process-wide subscriber.
///
/// Every task logs through this one subscriber; with a log directory set, a
/// non-blocking rolling file appender does the writing on its own worker
/// thread and the console gets a copy. The returned guard must live until
/// exit so buffered records are flushed.
pub fn init(debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = if debug { "mdtrelay=debug" } else { "mdtrelay=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mdtrelay.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(file_writer.and(std::io::stdout))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
            None
        }
    }
}
