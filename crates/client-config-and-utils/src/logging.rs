//! Logging initialization for the client.
//!
//! Thin wrapper over the observability package so the binary makes one call.

use observability::LogConfig;
use std::path::PathBuf;

const SERVICE_NAME: &str = "sessionctl";

/// Initialize logging.
///
/// * `level` - Default level, overridable with `RUST_LOG`
/// * `log_file` - Optional JSONL sink
/// * `also_stderr` - Also print compact logs to stderr
pub fn init_logging(level: &str, log_file: Option<PathBuf>, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path: log_file,
        also_stderr,
    });
}
