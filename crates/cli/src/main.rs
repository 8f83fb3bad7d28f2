use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod commands;
mod config;
mod logging;
mod profile;
mod signal;

use commands::{CleanupArgs, LiveArgs, ParseArgs, ReplayArgs};
use config::Settings;

#[derive(Parser)]
#[command(
    name = "eewpw",
    version,
    about = "Earthquake early warning log parser, replayer and live tailer"
)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// TOML configuration file (default: $EEWPW_CONFIG_FILE, then ./eewpw.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Directory holding `<algo>_<profile>.json` annotation profiles
    #[arg(long, value_name = "DIR", global = true)]
    profile_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse log files into one document or an envelope stream
    Parse(ParseArgs),
    /// Re-emit raw log lines into work files with their original pacing
    Replay(ReplayArgs),
    /// Follow a growing log file into daily storage
    Live(LiveArgs),
    /// Delete expired daily storage files
    Cleanup(CleanupArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.profile_dir {
        settings.profile_dir = dir;
    }
    info!(
        algo = %settings.parser.algo,
        profile_dir = %settings.profile_dir.display(),
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(signal::cancel_on_shutdown(cancel.clone()));

    match cli.command {
        Commands::Parse(args) => commands::parse::run(args, settings).await,
        Commands::Replay(args) => commands::replay::run(args, settings, cancel).await,
        Commands::Live(args) => commands::live::run(args, settings, cancel).await,
        Commands::Cleanup(args) => commands::cleanup::run(args, settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["eewpw", "cleanup", "--data-root", "/d", "-vv", "--log-json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Cleanup(_)));
    }
}
