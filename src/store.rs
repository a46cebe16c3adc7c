//! Durable backup state.
//!
//! The scrobbles backup is a pair of files, the full record collection and a
//! checkpoint describing it, rewritten together at every checkpoint. The data file is
//! written before the checkpoint, and each write goes through a temporary file that is
//! renamed into place, so a reader never sees a checkpoint whose `tracks_count`
//! disagrees with the data file beside it.

use crate::types::{BackupCheckpoint, FavouriteRecord, ScrobbleRecord};
use crate::{LastFmError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const SCROBBLES_FILE: &str = "scrobbles.json";
pub const STATE_FILE: &str = "scrobbles_state.json";
pub const FAVOURITES_FILE: &str = "favourites.json";

/// Storage used by the backup driver.
pub trait BackupStore {
    /// Load the checkpoint and check it against `username`.
    ///
    /// A checkpoint that is missing or cannot be parsed is [`LoadedCheckpoint::Absent`].
    fn load_checkpoint(&self, username: &str) -> LoadedCheckpoint;

    /// Load the stored scrobbles, or `None` if they are missing or unreadable.
    fn load_scrobbles(&self) -> Option<Vec<ScrobbleRecord>>;

    /// Persist the full record collection and then the checkpoint describing it.
    fn save_checkpoint(
        &mut self,
        checkpoint: &BackupCheckpoint,
        records: &[ScrobbleRecord],
    ) -> Result<()>;

    /// Whether a favourites backup already exists.
    fn favourites_exist(&self) -> bool;

    /// Write the favourites backup. Called once, with the complete list.
    fn save_favourites(&mut self, favourites: &[FavouriteRecord]) -> Result<()>;
}

fn check_consistent(checkpoint: &BackupCheckpoint, records: &[ScrobbleRecord]) -> Result<()> {
    if checkpoint.tracks_count != records.len() {
        return Err(LastFmError::Storage(format!(
            "checkpoint claims {} tracks but {} were given",
            checkpoint.tracks_count,
            records.len()
        )));
    }
    Ok(())
}

/// Result of [`BackupStore::load_checkpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedCheckpoint {
    Absent,
    Owned(BackupCheckpoint),
    /// The backup in the store belongs to another account, so neither the
    /// checkpoint nor the stored scrobbles may be used
    Foreign { username: String },
}

impl LoadedCheckpoint {
    pub fn into_owned(self) -> Option<BackupCheckpoint> {
        match self {
            LoadedCheckpoint::Owned(checkpoint) => Some(checkpoint),
            _ => None,
        }
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, LoadedCheckpoint::Foreign { .. })
    }
}

fn matches_user(checkpoint: BackupCheckpoint, username: &str) -> LoadedCheckpoint {
    if checkpoint.username != username {
        log::warn!(
            "Stored backup belongs to user '{}' (running as '{username}')",
            checkpoint.username
        );
        return LoadedCheckpoint::Foreign {
            username: checkpoint.username,
        };
    }
    LoadedCheckpoint::Owned(checkpoint)
}

// =============================================================================
// File storage
// =============================================================================

/// Backup files in a single directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scrobbles_path(&self) -> PathBuf {
        self.dir.join(SCROBBLES_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn favourites_path(&self) -> PathBuf {
        self.dir.join(FAVOURITES_FILE)
    }

    /// Read the checkpoint regardless of which account it belongs to.
    pub fn read_checkpoint(&self) -> Result<Option<BackupCheckpoint>> {
        read_json(&self.state_path())
    }

    pub fn read_favourites(&self) -> Result<Option<Vec<FavouriteRecord>>> {
        read_json(&self.favourites_path())
    }
}

impl BackupStore for FileStore {
    fn load_checkpoint(&self, username: &str) -> LoadedCheckpoint {
        match self.read_checkpoint() {
            Ok(Some(checkpoint)) => matches_user(checkpoint, username),
            Ok(None) => {
                log::debug!("No checkpoint at {}", self.state_path().display());
                LoadedCheckpoint::Absent
            }
            Err(e) => {
                log::warn!("Ignoring unreadable checkpoint: {e}");
                LoadedCheckpoint::Absent
            }
        }
    }

    fn load_scrobbles(&self) -> Option<Vec<ScrobbleRecord>> {
        match read_json(&self.scrobbles_path()) {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "Could not load {}, starting from scratch: {e}",
                    self.scrobbles_path().display()
                );
                None
            }
        }
    }

    fn save_checkpoint(
        &mut self,
        checkpoint: &BackupCheckpoint,
        records: &[ScrobbleRecord],
    ) -> Result<()> {
        check_consistent(checkpoint, records)?;
        write_json(&self.scrobbles_path(), &records)?;
        write_json(&self.state_path(), checkpoint)?;
        log::debug!(
            "Checkpoint saved: page {}/{}, {} tracks",
            checkpoint.last_page,
            checkpoint.total_pages,
            checkpoint.tracks_count
        );
        Ok(())
    }

    fn favourites_exist(&self) -> bool {
        self.favourites_path().exists()
    }

    fn save_favourites(&mut self, favourites: &[FavouriteRecord]) -> Result<()> {
        write_json(&self.favourites_path(), &favourites)
    }
}

/// Read a JSON file, returning `Ok(None)` if it does not exist.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Write `value` as pretty JSON with sorted keys and 4-space indentation.
///
/// The file is written beside the target and renamed over it.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    // serde_json::Map is ordered by key, so going through a Value sorts every object
    let value = serde_json::to_value(value)?;
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    value.serialize(&mut serializer)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

// =============================================================================
// In-memory storage
// =============================================================================

/// In-memory storage implementation for testing and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    checkpoint: Option<BackupCheckpoint>,
    scrobbles: Option<Vec<ScrobbleRecord>>,
    favourites: Option<Vec<FavouriteRecord>>,
    checkpoint_writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing backup, as if loaded from disk.
    pub fn with_backup(
        checkpoint: Option<BackupCheckpoint>,
        scrobbles: Option<Vec<ScrobbleRecord>>,
    ) -> Self {
        Self {
            checkpoint,
            scrobbles,
            ..Default::default()
        }
    }

    pub fn with_favourites(mut self, favourites: Vec<FavouriteRecord>) -> Self {
        self.favourites = Some(favourites);
        self
    }

    pub fn checkpoint(&self) -> Option<&BackupCheckpoint> {
        self.checkpoint.as_ref()
    }

    pub fn scrobbles(&self) -> Option<&[ScrobbleRecord]> {
        self.scrobbles.as_deref()
    }

    pub fn favourites(&self) -> Option<&[FavouriteRecord]> {
        self.favourites.as_deref()
    }

    /// Number of checkpoints written so far
    pub fn checkpoint_writes(&self) -> usize {
        self.checkpoint_writes
    }
}

impl BackupStore for MemoryStore {
    fn load_checkpoint(&self, username: &str) -> LoadedCheckpoint {
        match self.checkpoint.clone() {
            Some(checkpoint) => matches_user(checkpoint, username),
            None => LoadedCheckpoint::Absent,
        }
    }

    fn load_scrobbles(&self) -> Option<Vec<ScrobbleRecord>> {
        self.scrobbles.clone()
    }

    fn save_checkpoint(
        &mut self,
        checkpoint: &BackupCheckpoint,
        records: &[ScrobbleRecord],
    ) -> Result<()> {
        check_consistent(checkpoint, records)?;
        self.scrobbles = Some(records.to_vec());
        self.checkpoint = Some(checkpoint.clone());
        self.checkpoint_writes += 1;
        Ok(())
    }

    fn favourites_exist(&self) -> bool {
        self.favourites.is_some()
    }

    fn save_favourites(&mut self, favourites: &[FavouriteRecord]) -> Result<()> {
        self.favourites = Some(favourites.to_vec());
        Ok(())
    }
}
