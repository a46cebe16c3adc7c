//! Duplicate detection by scrobble identity (artist, track, album and timestamp).

use crate::types::{ScrobbleKey, ScrobbleRecord};
use std::collections::HashSet;

/// Set of scrobble identities already present in the backup.
///
/// Built once from the stored collection; every record appended afterwards is
/// added too, so re-fetching an already stored page is a no-op.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    keys: HashSet<ScrobbleKey>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[ScrobbleRecord]) -> Self {
        Self {
            keys: records.iter().map(ScrobbleRecord::key).collect(),
        }
    }

    pub fn has(&self, key: &ScrobbleKey) -> bool {
        self.keys.contains(key)
    }

    /// Add a key, returning `false` if it was already present.
    pub fn add(&mut self, key: ScrobbleKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, ts: i64) -> ScrobbleRecord {
        ScrobbleRecord {
            album: "In Rainbows".to_string(),
            artist: "Radiohead".to_string(),
            timestamp: ts,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_index_built_from_records() {
        let index = DedupIndex::from_records(&[record("Nude", 1), record("Reckoner", 2)]);
        assert_eq!(index.len(), 2);
        assert!(index.has(&record("Nude", 1).key()));
        assert!(!index.has(&record("Nude", 2).key()));
    }

    #[test]
    fn test_every_key_field_matters() {
        let mut index = DedupIndex::new();
        assert!(index.add(record("Nude", 1).key()));
        assert!(!index.add(record("Nude", 1).key()));

        let mut other_album = record("Nude", 1);
        other_album.album = "Nude (single)".to_string();
        assert!(index.add(other_album.key()));

        let mut other_artist = record("Nude", 1);
        other_artist.artist = "Thom Yorke".to_string();
        assert!(index.add(other_artist.key()));

        assert_eq!(index.len(), 3);
    }
}
