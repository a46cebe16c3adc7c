//! Resumable backup of a Last.fm account's scrobbles and loved tracks.
//!
//! Scrobbles are written to `scrobbles.json` with a checkpoint in
//! `scrobbles_state.json` every few pages, so an interrupted backup continues where
//! it stopped instead of starting over. Loved tracks go to `favourites.json` in one go.
//!
//! ```rust,no_run
//! use lastfm_backup::{BackupConfig, BackupDriver, FileStore, LastFmApiClientImpl};
//!
//! # tokio_test::block_on(async {
//! let config = BackupConfig::new("rj", "api-key").with_output_dir("backup");
//! let client = LastFmApiClientImpl::new(
//!     Box::new(http_client::native::NativeClient::new()),
//!     config.username.clone(),
//!     config.api_key.clone(),
//! );
//! let store = FileStore::new(&config.output_dir);
//!
//! let mut driver = BackupDriver::new(client, store, config.options());
//! let report = driver.run().await?;
//! println!("{} scrobbles backed up", report.scrobbles.total_records);
//! # Ok::<(), lastfm_backup::LastFmError>(())
//! # });
//! ```

pub mod api;
pub mod backup;
pub mod config;
pub mod dedup;
pub mod error;
pub mod normalize;
pub mod retry;
pub mod store;
pub mod types;

pub use api::{ApiPage, ApiTrack, LastFmApiClient, LastFmApiClientImpl, RecentTracksQuery};
#[cfg(feature = "mock")]
pub use api::MockLastFmApiClient;
pub use backup::{
    BackupDriver, BackupOptions, BackupProgress, BackupReport, FavouritesOutcome, Phase,
    ScrobbleMode, ScrobblesSummary,
};
pub use config::{BackupConfig, CredentialsFile};
pub use dedup::DedupIndex;
pub use error::LastFmError;
pub use normalize::Normalized;
pub use retry::{RetryLimit, RetryPolicy};
pub use store::{BackupStore, FileStore, LoadedCheckpoint, MemoryStore};
pub use types::{BackupCheckpoint, FavouriteRecord, ScrobbleKey, ScrobbleRecord};

pub type Result<T> = std::result::Result<T, LastFmError>;
