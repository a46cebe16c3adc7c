//! The backup driver: favourites (one shot) and scrobbles (resumable).
//!
//! Scrobble pages are always requested newest first starting at page 1. Resuming
//! never skips to a page number; it narrows the time window instead, asking only for
//! scrobbles older than everything already stored (`to = oldest - 1`). New scrobbles
//! arriving between runs therefore never shift the pages of history still to fetch.
//! A window left open at the top is pinned to the newest scrobble on page 1, so
//! scrobbles arriving during a run cannot shift it either.

use crate::api::{ApiPage, LastFmApiClient, RecentTracksQuery};
use crate::dedup::DedupIndex;
use crate::normalize::{normalize_favourite, normalize_scrobble, Normalized};
use crate::retry::{retry_operation, RetryPolicy};
use crate::store::{BackupStore, LoadedCheckpoint};
use crate::types::{resume_cutoff, BackupCheckpoint, ScrobbleRecord};
use crate::Result;

/// Default number of pages between checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 10;

/// Settings the driver needs; see [`crate::BackupConfig`] for where they come from.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub username: String,
    /// Pages between checkpoints; the final page is always checkpointed
    pub checkpoint_interval: u32,
    /// Scrobbles per page
    pub page_limit: u32,
    pub retry: RetryPolicy,
}

impl BackupOptions {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            page_limit: crate::api::RECENT_TRACKS_LIMIT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Which backup is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Favourites,
    Scrobbles,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Favourites => write!(f, "favourites"),
            Phase::Scrobbles => write!(f, "scrobbles"),
        }
    }
}

/// Emitted after each page has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupProgress {
    pub phase: Phase,
    pub page: u32,
    pub total_pages: u32,
}

impl BackupProgress {
    pub fn percent(&self) -> u32 {
        if self.total_pages == 0 {
            100
        } else {
            self.page * 100 / self.total_pages
        }
    }
}

/// How a scrobbles run relates to what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleMode {
    /// Nothing usable stored: fetch the whole history
    Full,
    /// Earlier run was interrupted: fetch history at or before `cutoff`
    Resume { cutoff: i64 },
    /// Previous run completed: check history at or before `cutoff`, then fetch
    /// scrobbles at or after `since`
    Update { cutoff: i64, since: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavouritesOutcome {
    /// `favourites.json` already existed; no request was made
    Skipped,
    Saved { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrobblesSummary {
    pub mode: ScrobbleMode,
    pub pages_fetched: u32,
    pub new_records: usize,
    pub total_records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupReport {
    pub favourites: FavouritesOutcome,
    pub scrobbles: ScrobblesSummary,
}

/// Decide how to continue from the stored records and checkpoint.
pub fn determine_mode(
    records: &[ScrobbleRecord],
    checkpoint: Option<&BackupCheckpoint>,
) -> ScrobbleMode {
    let Some(cutoff) = resume_cutoff(records) else {
        return ScrobbleMode::Full;
    };

    match checkpoint {
        Some(cp) if cp.completed && cp.tracks_count == records.len() => {
            let newest = records.iter().map(|r| r.timestamp).max().unwrap_or(cutoff);
            ScrobbleMode::Update {
                cutoff,
                since: newest + 1,
            }
        }
        Some(cp) => {
            if cp.tracks_count != records.len() {
                log::warn!(
                    "Checkpoint lists {} tracks but {} are stored; resuming from stored tracks",
                    cp.tracks_count,
                    records.len()
                );
            }
            ScrobbleMode::Resume { cutoff }
        }
        None => ScrobbleMode::Resume { cutoff },
    }
}

/// Pages fetched and records added by one pass over a time window.
#[derive(Debug, Default, Clone, Copy)]
struct PassStats {
    pages_fetched: u32,
    new_records: usize,
}

type ProgressCallback = Box<dyn FnMut(&BackupProgress)>;

/// Drives a backup of one account into a [`BackupStore`].
pub struct BackupDriver<C: LastFmApiClient, S: BackupStore> {
    client: C,
    store: S,
    options: BackupOptions,
    on_progress: Option<ProgressCallback>,
}

impl<C: LastFmApiClient, S: BackupStore> BackupDriver<C, S> {
    pub fn new(client: C, store: S, options: BackupOptions) -> Self {
        Self {
            client,
            store,
            options,
            on_progress: None,
        }
    }

    /// Register a callback invoked after every processed page.
    pub fn with_progress(mut self, on_progress: impl FnMut(&BackupProgress) + 'static) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Back up favourites, then scrobbles.
    pub async fn run(&mut self) -> Result<BackupReport> {
        let favourites = self.backup_favourites().await?;
        let scrobbles = self.backup_scrobbles().await?;
        Ok(BackupReport {
            favourites,
            scrobbles,
        })
    }

    /// Fetch every loved track and write them once.
    ///
    /// Skipped entirely when a favourites backup exists. Any failure aborts before
    /// anything is written.
    pub async fn backup_favourites(&mut self) -> Result<FavouritesOutcome> {
        if self.store.favourites_exist() {
            log::info!("Favourites file exists, skipping favourites download");
            return Ok(FavouritesOutcome::Skipped);
        }

        log::info!("Fetching favourites (loved tracks) for {}", self.options.username);
        let mut favourites = Vec::new();
        let mut page = 1;
        let mut total_pages = 1;

        while page <= total_pages {
            let api_page = self.fetch_loved(page).await?;
            if page == 1 {
                total_pages = api_page.total_pages;
            }

            for raw in &api_page.tracks {
                favourites.push(normalize_favourite(raw)?);
            }

            self.report(Phase::Favourites, page.min(total_pages), total_pages);
            page += 1;
        }

        self.store.save_favourites(&favourites)?;
        log::info!("Favourites saved ({} items)", favourites.len());
        Ok(FavouritesOutcome::Saved {
            count: favourites.len(),
        })
    }

    /// Back up scrobbles, continuing from whatever the store already holds.
    pub async fn backup_scrobbles(&mut self) -> Result<ScrobblesSummary> {
        let username = self.options.username.clone();
        let loaded = self.store.load_checkpoint(&username);
        let mut records = match &loaded {
            LoadedCheckpoint::Foreign { username: owner } => {
                log::warn!(
                    "Stored scrobbles belong to '{owner}', not '{username}'; starting a new backup"
                );
                Vec::new()
            }
            _ => self.store.load_scrobbles().unwrap_or_default(),
        };
        let checkpoint = loaded.into_owned();
        let mode = determine_mode(&records, checkpoint.as_ref());

        match mode {
            ScrobbleMode::Full => log::info!("No previous backup found; fetching all scrobbles"),
            ScrobbleMode::Resume { cutoff } => log::info!(
                "Resuming with {} stored tracks; fetching scrobbles up to {cutoff}",
                records.len()
            ),
            ScrobbleMode::Update { cutoff, since } => log::info!(
                "Backup of {} tracks is complete; checking scrobbles up to {cutoff} and since {since}",
                records.len()
            ),
        }

        let stats = match mode {
            ScrobbleMode::Full => self.fetch_older(&mut records, None).await?,
            ScrobbleMode::Resume { cutoff } => {
                self.fetch_older(&mut records, Some(cutoff)).await?
            }
            ScrobbleMode::Update { cutoff, since } => {
                let older = self.fetch_older(&mut records, Some(cutoff)).await?;
                if older.new_records > 0 {
                    log::warn!(
                        "Found {} scrobbles older than the completed backup",
                        older.new_records
                    );
                }
                let newer = self.fetch_newer(&mut records, since).await?;
                PassStats {
                    pages_fetched: older.pages_fetched + newer.pages_fetched,
                    new_records: older.new_records + newer.new_records,
                }
            }
        };

        log::info!(
            "Scrobbles saved ({} items, {} new)",
            records.len(),
            stats.new_records
        );
        Ok(ScrobblesSummary {
            mode,
            pages_fetched: stats.pages_fetched,
            new_records: stats.new_records,
            total_records: records.len(),
        })
    }

    /// Append history at or before `to`, checkpointing every interval.
    async fn fetch_older(
        &mut self,
        records: &mut Vec<ScrobbleRecord>,
        mut to: Option<i64>,
    ) -> Result<PassStats> {
        let interval = self.options.checkpoint_interval.max(1);
        let mut index = DedupIndex::from_records(records);
        let mut new_records = 0;
        let mut page = 1;
        let mut total_pages = 1;

        while page <= total_pages {
            let query = RecentTracksQuery {
                page,
                limit: self.options.page_limit,
                from: None,
                to,
            };
            let api_page = self.fetch_recent(&query).await?;
            let before = records.len();
            new_records += append_new(&api_page, &mut index, records)?;
            if page == 1 {
                total_pages = api_page.total_pages;
                to = to.or(newest_since(records, before));
            }
            self.report(Phase::Scrobbles, page.min(total_pages), total_pages);

            let is_last = page >= total_pages;
            if page % interval == 0 || is_last {
                let checkpoint = BackupCheckpoint::new(
                    &self.options.username,
                    page.min(total_pages),
                    total_pages,
                    records,
                    is_last,
                );
                self.store.save_checkpoint(&checkpoint, records)?;
            }
            page += 1;
        }

        Ok(PassStats {
            pages_fetched: page - 1,
            new_records,
        })
    }

    /// Prepend scrobbles at or after `since`, writing once at the end.
    ///
    /// Runs only after older history has been checked, so an interrupted update
    /// loses nothing and is simply repeated by the next run.
    async fn fetch_newer(
        &mut self,
        records: &mut Vec<ScrobbleRecord>,
        since: i64,
    ) -> Result<PassStats> {
        let mut index = DedupIndex::from_records(records);
        let mut fresh = Vec::new();
        let mut to = None;
        let mut page = 1;
        let mut total_pages = 1;

        while page <= total_pages {
            let query = RecentTracksQuery {
                page,
                limit: self.options.page_limit,
                from: Some(since),
                to,
            };
            let api_page = self.fetch_recent(&query).await?;
            append_new(&api_page, &mut index, &mut fresh)?;
            if page == 1 {
                total_pages = api_page.total_pages;
                to = newest_since(&fresh, 0);
            }
            self.report(Phase::Scrobbles, page.min(total_pages), total_pages);
            page += 1;
        }

        let new_records = fresh.len();
        if new_records > 0 {
            fresh.append(records);
            *records = fresh;

            let checkpoint = BackupCheckpoint::new(
                &self.options.username,
                total_pages,
                total_pages,
                records,
                true,
            );
            self.store.save_checkpoint(&checkpoint, records)?;
        }

        Ok(PassStats {
            pages_fetched: page - 1,
            new_records,
        })
    }

    async fn fetch_recent(&self, query: &RecentTracksQuery) -> Result<ApiPage> {
        let client = &self.client;
        retry_operation(&self.options.retry, "user.getrecenttracks", move || {
            client.recent_tracks_page(query)
        })
        .await
    }

    async fn fetch_loved(&self, page: u32) -> Result<ApiPage> {
        let client = &self.client;
        retry_operation(&self.options.retry, "user.getlovedtracks", move || {
            client.loved_tracks_page(page)
        })
        .await
    }

    fn report(&mut self, phase: Phase, page: u32, total_pages: u32) {
        let progress = BackupProgress {
            phase,
            page,
            total_pages,
        };
        log::debug!(
            "{phase} page {page}/{total_pages} ({}%)",
            progress.percent()
        );
        if let Some(on_progress) = self.on_progress.as_mut() {
            on_progress(&progress);
        }
    }
}

/// Newest timestamp among `records[start..]`.
fn newest_since(records: &[ScrobbleRecord], start: usize) -> Option<i64> {
    records.get(start..)?.iter().map(|r| r.timestamp).max()
}

/// Normalize a page and push the records not yet in `index`, returning how many were new.
fn append_new(
    page: &ApiPage,
    index: &mut DedupIndex,
    records: &mut Vec<ScrobbleRecord>,
) -> Result<usize> {
    let mut added = 0;
    for raw in &page.tracks {
        match normalize_scrobble(raw)? {
            Normalized::Record(record) => {
                if index.add(record.key()) {
                    records.push(record);
                    added += 1;
                }
            }
            Normalized::Skip => log::debug!("Skipping now playing track"),
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: i64) -> ScrobbleRecord {
        ScrobbleRecord {
            album: "Sea Change".to_string(),
            artist: "Beck".to_string(),
            timestamp: ts,
            name: format!("Track {ts}"),
        }
    }

    #[test]
    fn test_mode_without_records_is_full() {
        assert_eq!(determine_mode(&[], None), ScrobbleMode::Full);

        let checkpoint = BackupCheckpoint::new("rj", 3, 3, &[record(5)], true);
        assert_eq!(determine_mode(&[], Some(&checkpoint)), ScrobbleMode::Full);
    }

    #[test]
    fn test_mode_resumes_below_oldest_record() {
        let records = vec![record(300), record(200)];
        assert_eq!(
            determine_mode(&records, None),
            ScrobbleMode::Resume { cutoff: 199 }
        );

        let checkpoint = BackupCheckpoint::new("rj", 10, 40, &records, false);
        assert_eq!(
            determine_mode(&records, Some(&checkpoint)),
            ScrobbleMode::Resume { cutoff: 199 }
        );
    }

    #[test]
    fn test_mode_updates_after_completed_backup() {
        let records = vec![record(300), record(200)];
        let checkpoint = BackupCheckpoint::new("rj", 1, 1, &records, true);
        assert_eq!(
            determine_mode(&records, Some(&checkpoint)),
            ScrobbleMode::Update {
                cutoff: 199,
                since: 301
            }
        );
    }

    #[test]
    fn test_mode_inconsistent_completed_checkpoint_resumes() {
        let records = vec![record(300), record(200)];
        let mut checkpoint = BackupCheckpoint::new("rj", 1, 1, &records, true);
        checkpoint.tracks_count = 3;
        assert_eq!(
            determine_mode(&records, Some(&checkpoint)),
            ScrobbleMode::Resume { cutoff: 199 }
        );
    }

    #[test]
    fn test_newest_since_looks_only_at_appended_records() {
        let records = vec![record(900), record(300), record(200)];
        assert_eq!(newest_since(&records, 1), Some(300));
        assert_eq!(newest_since(&records, 0), Some(900));
        assert_eq!(newest_since(&records, 3), None);
    }

    #[test]
    fn test_progress_percent() {
        let progress = BackupProgress {
            phase: Phase::Scrobbles,
            page: 1,
            total_pages: 3,
        };
        assert_eq!(progress.percent(), 33);
        assert_eq!(
            BackupProgress {
                total_pages: 0,
                ..progress
            }
            .percent(),
            100
        );
    }
}
