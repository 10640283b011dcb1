use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset.
pub const FILE_FILTER: &str = "info";

/// Routes `tracing` output to a daily rolling file, since the terminal belongs to the UI.
/// Keep the returned guard alive for the lifetime of the process.
pub fn init_file_logging(log_dir: &Path) -> Option<WorkerGuard> {
    fs::create_dir_all(log_dir).ok()?;
    let appender = tracing_appender::rolling::daily(log_dir, "footy_value.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(FILE_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .ok()?;
    Some(guard)
}

/// Minimal stderr logging for the command-line binaries.
pub fn init_cli_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_filter_defaults_to_info() {
        assert_eq!(EnvFilter::new(FILE_FILTER).to_string(), "info");
    }
}
