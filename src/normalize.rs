//! Conversion of raw API track entries into the records we store.

use crate::api::ApiTrack;
use crate::types::{FavouriteRecord, ScrobbleRecord};
use crate::{LastFmError, Result};

/// Outcome of normalizing a recent-tracks entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// A completed play
    Record(ScrobbleRecord),
    /// A "now playing" marker, which has no play timestamp yet
    Skip,
}

/// Normalize a `user.getrecenttracks` entry.
///
/// Dateless entries flagged as now playing are skipped. Any other entry missing
/// artist, name, album or date is a [`LastFmError::MalformedRecord`].
pub fn normalize_scrobble(track: &ApiTrack) -> Result<Normalized> {
    let uts = track.date.as_ref().and_then(|d| d.uts.as_deref());

    if uts.is_none() && track.is_now_playing() {
        return Ok(Normalized::Skip);
    }

    let artist = track
        .artist
        .as_ref()
        .and_then(|a| a.display_name())
        .ok_or_else(|| malformed("artist", track))?;
    let name = track.name.as_deref().ok_or_else(|| malformed("name", track))?;
    let album = track
        .album
        .as_ref()
        .and_then(|a| a.text.as_deref())
        .ok_or_else(|| malformed("album", track))?;
    let timestamp = uts
        .and_then(|uts| uts.trim().parse::<i64>().ok())
        .ok_or_else(|| malformed("date", track))?;

    Ok(Normalized::Record(ScrobbleRecord {
        album: album.to_string(),
        artist: artist.to_string(),
        timestamp,
        name: name.to_string(),
    }))
}

/// Normalize a `user.getlovedtracks` entry.
///
/// Artist and name are required; date, mbid and url fall back to `None`.
pub fn normalize_favourite(track: &ApiTrack) -> Result<FavouriteRecord> {
    let artist = track
        .artist
        .as_ref()
        .and_then(|a| a.display_name())
        .ok_or_else(|| malformed("artist", track))?;
    let name = track.name.as_deref().ok_or_else(|| malformed("name", track))?;

    Ok(FavouriteRecord {
        artist: artist.to_string(),
        timestamp: track
            .date
            .as_ref()
            .and_then(|d| d.uts.as_deref())
            .and_then(|uts| uts.trim().parse().ok()),
        mbid: non_empty(track.mbid.as_deref()),
        name: name.to_string(),
        url: non_empty(track.url.as_deref()),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn malformed(field: &'static str, track: &ApiTrack) -> LastFmError {
    log::error!("while processing {track:?}");
    LastFmError::MalformedRecord {
        field,
        record: format!("{track:?}"),
    }
}
