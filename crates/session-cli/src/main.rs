//! sessionctl - command-line client for session-authenticated APIs.

mod boundary;
mod commands;
mod output;

use boundary::CommandStatus;
use clap::{Parser, Subcommand};
use client_config_and_utils::init_logging;
use commands::{AppContext, ClientOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

/// sessionctl - check your session and fetch protected resources.
#[derive(Parser)]
#[command(name = "sessionctl")]
#[command(about = "Session-aware client for the music API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// API root URL
    #[arg(long, env = "SESSIONCTL_API_URL", global = true)]
    api_url: Option<String>,

    /// Directory holding config.json and logs (default ~/.sessionctl)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Print the login URL instead of opening a browser
    #[arg(long, global = true)]
    no_browser: bool,

    /// Also write logs to stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether you are logged in
    Status,

    /// Log in through the browser
    Login {
        /// Keep checking for up to this many seconds until the login completes
        #[arg(long)]
        wait: Option<u64>,
    },

    /// Log out
    Logout,

    /// Show the logged-in user
    Whoami,

    /// List saved tracks
    Tracks,

    /// Fetch a protected resource by path (e.g. /recommendations)
    Open {
        /// Resource path under the API root
        path: String,
    },

    /// Check API health
    Health,
}

async fn run(cli: &Cli) -> anyhow::Result<CommandStatus> {
    let options = ClientOptions {
        api_url: cli.api_url.clone(),
        base_dir: cli.base_dir.clone(),
        no_browser: cli.no_browser,
    };
    let (_paths, config) = commands::load_config(&options)?;
    let ctx = AppContext::connect(&config, &options)?;
    let format = &cli.format;

    let status = match &cli.command {
        Commands::Status => commands::status(&ctx, format).await,
        Commands::Login { wait } => {
            commands::login(&ctx, wait.map(Duration::from_secs), format).await
        }
        Commands::Logout => commands::logout(&ctx, format).await,
        Commands::Whoami => commands::whoami(&ctx, format).await,
        Commands::Tracks => commands::tracks(&ctx, format).await,
        Commands::Open { path } => commands::open(&ctx, path, format).await,
        Commands::Health => commands::health(&ctx, format).await,
    };

    ctx.session.dispose();
    status
}

/// Resolve the log level and file before anything else runs, so that
/// config loading itself is logged.
fn init_logging_for(cli: &Cli) {
    let options = ClientOptions {
        api_url: None,
        base_dir: cli.base_dir.clone(),
        no_browser: cli.no_browser,
    };
    let config = commands::load_config(&options).ok().map(|(paths, config)| {
        let log_file = config.log_file.clone().or_else(|| {
            paths.ensure_dirs().ok().map(|_| paths.log_file())
        });
        (config.log_level, log_file)
    });

    let (config_level, log_file) = config.unwrap_or_else(|| ("warn".to_string(), None));
    let level = cli.log_level.clone().unwrap_or(config_level);
    init_logging(&level, log_file, cli.verbose);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging_for(&cli);
    debug!(format = ?cli.format, "sessionctl starting");

    boundary::run_with_recovery(cli.format, || run(&cli))
        .await
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login_wait() {
        let cli =
            Cli::try_parse_from(["sessionctl", "login", "--wait", "60", "--no-browser"]).unwrap();
        assert!(cli.no_browser);
        assert!(matches!(cli.command, Commands::Login { wait: Some(60) }));
    }

    #[test]
    fn test_parse_open_with_json_format() {
        let cli = Cli::try_parse_from([
            "sessionctl",
            "--format",
            "json",
            "open",
            "/recommendations",
        ])
        .unwrap();
        assert_eq!(cli.format, output::OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Open { ref path } if path == "/recommendations"));
    }
}
