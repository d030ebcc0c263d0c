use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the logging system with both console and file output.
pub fn init_logging() {
    ensure_log_dir(Path::new("logs"));

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily("logs", "rec_quality.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // JSON lines in the file so runs can be audited by record id
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    // Console goes to stderr; stdout carries the run summary
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    // Respect RUST_LOG if set; otherwise default to info for our crate
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rec_quality=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // We need to keep the guard in scope to ensure logs are flushed on exit
    std::mem::forget(_guard);
}

/// Create the log directory, reporting failure on stderr since no subscriber exists yet
fn ensure_log_dir(dir: &Path) -> bool {
    match fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Failed to create logs directory {}: {}", dir.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_log_dir_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_log_dir(&dir.path().join("logs")));

        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        assert!(!ensure_log_dir(&blocker.join("logs")));
    }
}
