//! Data types for backed up Last.fm history.
//!
//! These are the shapes written to the local JSON files: the scrobble and favourite
//! records and the checkpoint describing how far a scrobbles backup has progressed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ================================================================================================
// RECORDS
// ================================================================================================

/// A single completed play, as stored in `scrobbles.json`.
///
/// Records are never constructed from "now playing" entries; every record has a
/// real play timestamp.
///
/// # Examples
///
/// ```rust
/// use lastfm_backup::ScrobbleRecord;
///
/// let record = ScrobbleRecord {
///     album: "OK Computer".to_string(),
///     artist: "Radiohead".to_string(),
///     timestamp: 1640995200,
///     name: "Paranoid Android".to_string(),
/// };
///
/// assert_eq!(format!("{record}"), "Radiohead - Paranoid Android [OK Computer]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrobbleRecord {
    /// The album name (empty when Last.fm has none)
    pub album: String,
    /// The artist display name
    pub artist: String,
    /// Unix timestamp of the play
    #[serde(rename = "date", deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
    /// The track name
    pub name: String,
}

impl ScrobbleRecord {
    /// Identity of this play, used to skip records that are already stored.
    pub fn key(&self) -> ScrobbleKey {
        ScrobbleKey {
            artist: self.artist.clone(),
            name: self.name.clone(),
            album: self.album.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Get the play time as a UTC datetime.
    pub fn scrobbled_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

impl std::fmt::Display for ScrobbleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.album.is_empty() {
            write!(f, "{} - {}", self.artist, self.name)
        } else {
            write!(f, "{} - {} [{}]", self.artist, self.name, self.album)
        }
    }
}

/// Identity key of a scrobble: (artist, track name, album, timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrobbleKey {
    pub artist: String,
    pub name: String,
    pub album: String,
    pub timestamp: i64,
}

/// A loved track, as stored in `favourites.json`.
///
/// Only the artist and track name are guaranteed; the rest degrade to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavouriteRecord {
    /// The artist display name
    pub artist: String,
    /// Unix timestamp of when the track was loved
    #[serde(
        rename = "date",
        default,
        deserialize_with = "deserialize_optional_timestamp"
    )]
    pub timestamp: Option<i64>,
    /// MusicBrainz id of the track
    #[serde(default)]
    pub mbid: Option<String>,
    /// The track name
    pub name: String,
    /// Last.fm page of the track
    #[serde(default)]
    pub url: Option<String>,
}

impl std::fmt::Display for FavouriteRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.name)
    }
}

// ================================================================================================
// CHECKPOINT
// ================================================================================================

/// Durable progress of a scrobbles backup, stored in `scrobbles_state.json`.
///
/// A checkpoint is only meaningful for the account named in `username`, and
/// `tracks_count` always equals the length of the scrobbles file written with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCheckpoint {
    /// Whether the run that wrote this checkpoint reached its final page
    #[serde(default)]
    pub completed: bool,
    /// Last page (1-indexed) fully processed in the run's time window
    pub last_page: u32,
    /// Upper time bound for the next resumed fetch (oldest stored timestamp - 1)
    #[serde(default)]
    pub resume_cutoff: Option<i64>,
    /// Total pages reported for the run's time window
    pub total_pages: u32,
    /// Number of records in the scrobbles file
    pub tracks_count: usize,
    /// When this checkpoint was written
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Account this checkpoint belongs to
    pub username: String,
}

impl BackupCheckpoint {
    /// Build a checkpoint describing `records` after processing `last_page` of `total_pages`.
    pub fn new(
        username: &str,
        last_page: u32,
        total_pages: u32,
        records: &[ScrobbleRecord],
        completed: bool,
    ) -> Self {
        Self {
            completed,
            last_page,
            resume_cutoff: resume_cutoff(records),
            total_pages,
            tracks_count: records.len(),
            updated_at: Some(Utc::now()),
            username: username.to_string(),
        }
    }
}

/// The upper bound for fetching history older than everything in `records`.
pub fn resume_cutoff(records: &[ScrobbleRecord]) -> Option<i64> {
    records.iter().map(|r| r.timestamp).min().map(|oldest| oldest - 1)
}

// ================================================================================================
// SERDE HELPERS
// ================================================================================================

/// Timestamps written by older tooling are decimal strings; ours are integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Int(i64),
    Str(String),
}

impl RawTimestamp {
    fn into_i64<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            RawTimestamp::Int(ts) => Ok(ts),
            RawTimestamp::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid timestamp '{s}'"))),
        }
    }
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    RawTimestamp::deserialize(deserializer)?.into_i64()
}

fn deserialize_optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    Option::<RawTimestamp>::deserialize(deserializer)?
        .map(RawTimestamp::into_i64)
        .transpose()
}
