//! CLI module for the PPE monitor
//!
//! Command-line interface definitions and handlers.
//!
//! # Commands
//!
//! - `run` - Start the monitor (pipeline, backend connection, dashboard)
//! - `history` - Inspect or clear the persisted detection history
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Start with default config and begin detecting once connected
//! ppe-monitor run --start
//!
//! # Show the last detections
//! ppe-monitor history list
//!
//! # Generate shell completions
//! ppe-monitor completions bash > ~/.bash_completion.d/ppe-monitor
//! ```

pub mod completions;
pub mod config;
pub mod history;
pub mod output;
pub mod run;

pub use completions::handle_completions;
pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// PPE monitor - adaptive real-time PPE compliance detection
#[derive(Parser, Debug)]
#[command(
    name = "ppe-monitor",
    version,
    about = "Real-time PPE compliance monitor driven by a remote detection backend"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the monitor
    Run(RunArgs),
    /// Detection history
    #[command(subcommand)]
    History(HistoryCommands),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "ppe-monitor.toml")]
    pub config: PathBuf,

    /// Override dashboard port
    #[arg(short, long, env = "PPE_PORT")]
    pub port: Option<u16>,

    /// Override dashboard host
    #[arg(short = 'H', long, env = "PPE_HOST")]
    pub host: Option<String>,

    /// Override detection backend URL
    #[arg(short, long, env = "PPE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Override directory holding history and settings
    #[arg(short, long, env = "PPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PPE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Capture from an image file instead of the configured camera
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Do not connect to the backend on startup
    #[arg(long)]
    pub no_auto_connect: bool,

    /// Do not serve the dashboard
    #[arg(long)]
    pub no_server: bool,

    /// Start detecting as soon as the backend is connected
    #[arg(long)]
    pub start: bool,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List persisted detections, newest first
    List(HistoryListArgs),
    /// Delete every persisted detection
    Clear(HistoryClearArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HistoryListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show at most this many records
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Only show incomplete detections
    #[arg(long)]
    pub incomplete: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "ppe-monitor.toml")]
    pub config: PathBuf,

    /// Override directory holding history and settings
    #[arg(short, long, env = "PPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryClearArgs {
    /// Confirm the deletion
    #[arg(short, long)]
    pub yes: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "ppe-monitor.toml")]
    pub config: PathBuf,

    /// Override directory holding history and settings
    #[arg(short, long, env = "PPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "ppe-monitor.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::try_parse_from(["ppe-monitor", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("ppe-monitor.toml"));
                assert!(!args.no_auto_connect);
                assert!(!args.start);
                assert!(args.image.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_with_port() {
        let cli = Cli::try_parse_from(["ppe-monitor", "run", "-p", "9000"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert_eq!(args.port, Some(9000)),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "ppe-monitor",
            "run",
            "--backend-url",
            "http://detector:8000",
            "--image",
            "frame.jpg",
            "--no-auto-connect",
            "--start",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.backend_url.as_deref(), Some("http://detector:8000"));
                assert_eq!(args.image, Some(PathBuf::from("frame.jpg")));
                assert!(args.no_auto_connect);
                assert!(args.start);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_history_list() {
        let cli =
            Cli::try_parse_from(["ppe-monitor", "history", "list", "--json", "-n", "5"]).unwrap();
        match cli.command {
            Commands::History(HistoryCommands::List(args)) => {
                assert!(args.json);
                assert_eq!(args.limit, Some(5));
            }
            _ => panic!("Expected History List command"),
        }
    }

    #[test]
    fn test_cli_parse_history_clear() {
        let cli = Cli::try_parse_from(["ppe-monitor", "history", "clear", "--yes"]).unwrap();
        match cli.command {
            Commands::History(HistoryCommands::Clear(args)) => assert!(args.yes),
            _ => panic!("Expected History Clear command"),
        }
    }

    #[test]
    fn test_cli_parse_config_init() {
        let cli = Cli::try_parse_from(["ppe-monitor", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Init(ConfigInitArgs { force: true, .. }))
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["ppe-monitor", "serve"]).is_err());
    }
}
