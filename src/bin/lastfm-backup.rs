mod commands;

use clap::Parser;
use commands::{execute_command, Commands};
use lastfm_backup::config::{resolve_credentials, CredentialsFile};
use lastfm_backup::{BackupConfig, RetryPolicy};
use std::path::PathBuf;

/// Back up Last.fm scrobbles and loved tracks to JSON files
#[derive(Parser)]
#[command(
    name = "lastfm-backup",
    about = "Back up Last.fm scrobbles and loved tracks to JSON files",
    long_about = None
)]
struct Cli {
    /// Show detailed debug information
    #[arg(long, global = true)]
    verbose: bool,

    /// Last.fm username
    #[arg(long, global = true, env = "LASTFM_USERNAME")]
    username: Option<String>,

    /// Last.fm API key
    #[arg(long, global = true, env = "LASTFM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Credentials file (defaults to ~/.config/lastfm-backup/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory the backup files are written to
    #[arg(long, global = true, default_value = ".")]
    output_dir: PathBuf,

    /// Give up on a request after this many attempts instead of retrying for up to an hour
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let credentials_path = args.config.clone().or_else(CredentialsFile::default_path);
    let credentials_file = match credentials_path {
        Some(path) => CredentialsFile::load(&path)?,
        None => None,
    };

    let (username, api_key) =
        match resolve_credentials(args.username, args.api_key, credentials_file) {
            Ok(creds) => creds,
            Err(e) => {
                eprintln!("❌ Error: {e}");
                eprintln!();
                eprintln!("Please set the following environment variables:");
                eprintln!("  LASTFM_USERNAME=your_lastfm_username");
                eprintln!("  LASTFM_API_KEY=your_lastfm_api_key");
                eprintln!();
                eprintln!("or pass --username/--api-key, or create a credentials file:");
                eprintln!("  {{ \"username\": \"...\", \"api_key\": \"...\" }}");
                std::process::exit(1);
            }
        };

    let retry = match args.max_attempts {
        Some(attempts) => RetryPolicy::with_attempts(attempts),
        None => RetryPolicy::default(),
    };
    let config = BackupConfig::new(username, api_key)
        .with_output_dir(args.output_dir)
        .with_retry(retry);

    log::debug!("Backing up '{}' into {}", config.username, config.output_dir.display());

    if let Err(e) = execute_command(args.command.unwrap_or(Commands::All), &config).await {
        eprintln!();
        eprintln!("❌ Backup failed: {e}");
        std::process::exit(1);
    }

    Ok(())
}
