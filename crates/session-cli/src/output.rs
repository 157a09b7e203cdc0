//! Output formatting for the CLI.

use api_client::ApiError;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print output in the specified format.
pub fn print<T: Serialize + std::fmt::Display>(value: &T, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            } else {
                println!("{}", value);
            }
        }
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => {
            println!("{}", json!({ "status": "success", "message": message }));
        }
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => {
            eprintln!("{}", json!({ "status": "error", "message": message }));
        }
    }
}

/// Print an API error with its code and details.
pub fn print_api_error(error: &ApiError, retry_hint: Option<&str>, format: &OutputFormat) {
    eprintln!("{}", render_api_error(error, retry_hint, format));
}

/// Render an API error. The retry hint is shown only in text output.
pub fn render_api_error(
    error: &ApiError,
    retry_hint: Option<&str>,
    format: &OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "Error: {}\n  {:<8} {}",
                error.user_message(),
                "Code:",
                error.code()
            );
            if error.user_message() != error.message() {
                out.push_str(&format!("\n  {:<8} {}", "Reason:", error.message()));
            }
            if let Some(details) = error.details() {
                out.push_str(&format!("\n  {:<8} {}", "Details:", details));
            }
            if let Some(hint) = retry_hint {
                out.push_str(&format!("\n\n{}", hint));
            }
            out
        }
        OutputFormat::Json => json!({
            "status": "error",
            "code": error.code(),
            "message": error.message(),
            "user_message": error.user_message(),
            "details": error.details(),
        })
        .to_string(),
    }
}

/// A label/value row for text output.
pub fn row(label: &str, value: &str) -> String {
    format!("  {:<16} {}", format!("{}:", label), value)
}
