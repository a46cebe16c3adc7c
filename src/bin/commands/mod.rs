use clap::Subcommand;
use lastfm_backup::{
    BackupConfig, BackupDriver, BackupProgress, FavouritesOutcome, FileStore,
    LastFmApiClientImpl, ScrobbleMode,
};
use std::io::Write;

#[derive(Subcommand, Clone, Copy)]
pub enum Commands {
    /// Back up loved tracks (if not already backed up), then scrobbles
    All,

    /// Back up loved tracks into favourites.json
    ///
    /// Skipped when favourites.json already exists; delete it to refresh.
    Favourites,

    /// Back up scrobbles into scrobbles.json
    ///
    /// Resumes an interrupted backup, or fetches only new scrobbles when the
    /// previous backup completed.
    Scrobbles,

    /// Show the stored checkpoint without contacting Last.fm
    Status,
}

pub async fn execute_command(
    command: Commands,
    config: &BackupConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::new(&config.output_dir);

    if let Commands::Status = command {
        return show_status(&store, config);
    }

    let http_client = http_client::native::NativeClient::new();
    let client = LastFmApiClientImpl::new(
        Box::new(http_client),
        config.username.clone(),
        config.api_key.clone(),
    )
    .with_loved_limit(config.loved_page_limit);

    let mut driver = BackupDriver::new(client, store, config.options()).with_progress(print_progress);

    if matches!(command, Commands::All | Commands::Favourites) {
        match driver.backup_favourites().await? {
            FavouritesOutcome::Skipped => {
                eprintln!("Favourites file exists, skipping favourites download.")
            }
            FavouritesOutcome::Saved { count } => {
                eprintln!();
                eprintln!(
                    "Favourites saved to {} ({count} items)",
                    driver.store().favourites_path().display()
                );
            }
        }
    }

    if matches!(command, Commands::All | Commands::Scrobbles) {
        let summary = driver.backup_scrobbles().await?;
        eprintln!();
        match summary.mode {
            ScrobbleMode::Full => {}
            ScrobbleMode::Resume { .. } => eprintln!("Resumed previous backup."),
            ScrobbleMode::Update { .. } => eprintln!("Updated completed backup."),
        }
        eprintln!(
            "Scrobbles saved to {} ({} items, {} new)",
            driver.store().scrobbles_path().display(),
            summary.total_records,
            summary.new_records
        );
    }

    Ok(())
}

fn print_progress(progress: &BackupProgress) {
    let label = match progress.phase {
        lastfm_backup::Phase::Favourites => "favourites page",
        lastfm_backup::Phase::Scrobbles => "page",
    };
    eprint!(
        "\r{label} {}/{} {}%",
        progress.page,
        progress.total_pages,
        progress.percent()
    );
    std::io::stderr().flush().ok();
}

fn show_status(
    store: &FileStore,
    config: &BackupConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match store.read_checkpoint()? {
        None => println!("No scrobbles backup in {}", store.dir().display()),
        Some(checkpoint) if checkpoint.username != config.username => println!(
            "Checkpoint in {} belongs to '{}', not '{}'",
            store.dir().display(),
            checkpoint.username,
            config.username
        ),
        Some(checkpoint) => {
            let state = if checkpoint.completed {
                "complete"
            } else {
                "interrupted"
            };
            println!("User:          {}", checkpoint.username);
            println!("State:         {state}");
            println!(
                "Progress:      page {}/{}",
                checkpoint.last_page, checkpoint.total_pages
            );
            println!("Tracks:        {}", checkpoint.tracks_count);
            if let Some(cutoff) = checkpoint.resume_cutoff {
                let when = chrono::DateTime::from_timestamp(cutoff, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| cutoff.to_string());
                println!("Resume before: {when}");
            }
            if let Some(updated_at) = checkpoint.updated_at {
                println!("Updated:       {}", updated_at.to_rfc3339());
            }
        }
    }

    match store.read_favourites() {
        Ok(Some(favourites)) => println!("Favourites:    {} loved tracks", favourites.len()),
        Ok(None) => println!("Favourites:    not backed up"),
        Err(e) => println!("Favourites:    unreadable ({e})"),
    }

    Ok(())
}
