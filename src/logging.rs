use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "emuseum_recon=info";

/// Initializes the logging system with both console and file output.
///
/// The file layer writes JSON lines to `<log_dir>/recon.log`, rotated daily.
/// The returned guard must be held for the lifetime of the process so buffered
/// lines are flushed on exit.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = match DEFAULT_DIRECTIVE.parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    if fs::create_dir_all(log_dir).is_err() {
        // Console only when the log directory cannot be created.
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "recon.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Some(guard)
}
