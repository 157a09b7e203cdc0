//! Configuration, paths, and logging setup for the sessionctl client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_BACKOFF_BASE_MS, DEFAULT_LOGIN_ROUTE,
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
