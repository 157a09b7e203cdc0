//! Top-level recovery boundary.
//!
//! Core failures (`ApiError`) are handled by the commands themselves. Anything
//! else that escapes a command, an error or a panic, lands here and is shown
//! as an `APP_ERROR` recovery view with the option to run the command again.

use crate::output::OutputFormat;
use api_client::{ApiError, ErrorCode};
use futures_util::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use tracing::{error, info};

const APP_ERROR_MESSAGE: &str = "Something went wrong";

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// The command reported a failure to the user already.
    Failed,
}

impl From<CommandStatus> for ExitCode {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => ExitCode::SUCCESS,
            CommandStatus::Failed => ExitCode::FAILURE,
        }
    }
}

/// Run `command`, offering a retry after faults when attached to a terminal.
pub async fn run_with_recovery<F, Fut>(format: OutputFormat, mut command: F) -> CommandStatus
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<CommandStatus>>,
{
    let interactive = io::stdin().is_terminal() && format == OutputFormat::Text;

    loop {
        match run_once(command()).await {
            Ok(status) => return status,
            Err(fault) => {
                error!(details = ?fault.details(), "Command failed outside managed paths");
                eprintln!("{}", render_recovery(&fault, &format));

                if !(interactive && confirm("Retry?")) {
                    return CommandStatus::Failed;
                }
                info!("Retrying command after fault");
            }
        }
    }
}

/// Run one attempt, turning errors and panics into an `APP_ERROR`.
pub async fn run_once<Fut>(command: Fut) -> Result<CommandStatus, ApiError>
where
    Fut: Future<Output = anyhow::Result<CommandStatus>>,
{
    match AssertUnwindSafe(command).catch_unwind().await {
        Ok(Ok(status)) => Ok(status),
        Ok(Err(err)) => Err(app_error(Value::String(format!("{:#}", err)))),
        Err(panic) => Err(app_error(Value::String(panic_message(panic.as_ref())))),
    }
}

fn app_error(details: Value) -> ApiError {
    ApiError::new(ErrorCode::AppError, APP_ERROR_MESSAGE).with_details(details)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// The generic recovery view.
pub fn render_recovery(fault: &ApiError, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!("{}\n  {:<8} {}", fault.message(), "Code:", fault.code());
            if let Some(Value::String(details)) = fault.details() {
                out.push_str(&format!("\n  {:<8} {}", "Details:", details));
            }
            out.push_str("\n\nRun the command again to retry.");
            out
        }
        OutputFormat::Json => json!({
            "status": "error",
            "code": fault.code(),
            "message": fault.message(),
            "details": fault.details(),
        })
        .to_string(),
    }
}

/// Ask user for confirmation.
fn confirm(prompt: &str) -> bool {
    eprint!("{} [y/N] ", prompt);
    io::stderr().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}
