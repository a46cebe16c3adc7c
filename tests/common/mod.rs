#![allow(dead_code)]
use async_trait::async_trait;
use lastfm_backup::api::{ApiArtist, ApiDate, ApiTextField, ApiTrackAttr};
use lastfm_backup::{
    ApiPage, ApiTrack, LastFmApiClient, LastFmError, RecentTracksQuery, Result, RetryPolicy,
    ScrobbleRecord,
};
use std::cell::{Cell, RefCell};
use std::time::Duration;

pub const BASE_TIMESTAMP: i64 = 1_600_000_000;

/// `count` scrobbles, newest first, one minute apart.
pub fn scrobbles(count: usize) -> Vec<ScrobbleRecord> {
    scrobbles_from(BASE_TIMESTAMP, count)
}

/// `count` scrobbles newest first, the oldest at `oldest`.
pub fn scrobbles_from(oldest: i64, count: usize) -> Vec<ScrobbleRecord> {
    (0..count)
        .rev()
        .map(|i| ScrobbleRecord {
            album: format!("Album {}", i / 10),
            artist: format!("Artist {}", i % 7),
            timestamp: oldest + i as i64 * 60,
            name: format!("Track {i}"),
        })
        .collect()
}

pub fn raw_scrobble(record: &ScrobbleRecord) -> ApiTrack {
    ApiTrack {
        name: Some(record.name.clone()),
        artist: Some(ApiArtist {
            name: None,
            text: Some(record.artist.clone()),
        }),
        album: Some(ApiTextField {
            text: Some(record.album.clone()),
        }),
        date: Some(ApiDate {
            uts: Some(record.timestamp.to_string()),
        }),
        ..Default::default()
    }
}

pub fn now_playing() -> ApiTrack {
    ApiTrack {
        name: Some("Currently Spinning".to_string()),
        artist: Some(ApiArtist {
            name: None,
            text: Some("Live Artist".to_string()),
        }),
        album: Some(ApiTextField {
            text: Some("Live Album".to_string()),
        }),
        attr: Some(ApiTrackAttr {
            nowplaying: Some("true".to_string()),
        }),
        ..Default::default()
    }
}

pub fn loved(artist: &str, name: &str, uts: Option<&str>) -> ApiTrack {
    ApiTrack {
        name: Some(name.to_string()),
        artist: Some(ApiArtist {
            name: Some(artist.to_string()),
            text: None,
        }),
        date: uts.map(|uts| ApiDate {
            uts: Some(uts.to_string()),
        }),
        mbid: Some(String::new()),
        url: Some(format!("https://www.last.fm/music/{artist}/_/{name}")),
        ..Default::default()
    }
}

/// Retry quickly so tests that exercise retries stay fast.
pub fn test_retry_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        limit: lastfm_backup::RetryLimit::MaxAttempts(attempts),
        ..RetryPolicy::with_delays(Duration::from_millis(1), Duration::from_millis(4))
    }
}

/// In-memory stand-in for the Last.fm API.
///
/// Serves `scrobbles` (newest first) honouring `from`, `to`, `page` and `limit`
/// the way `user.getrecenttracks` does, and `loved` in pages of `loved_limit`.
#[derive(Default)]
pub struct FakeLastFm {
    scrobbles: RefCell<Vec<ScrobbleRecord>>,
    loved: Vec<ApiTrack>,
    loved_limit: u32,
    now_playing: bool,
    /// Extra raw entries appended to a given page
    extra: RefCell<Vec<(u32, ApiTrack)>>,
    /// Widen the `to` bound by this many seconds, returning records the API should not
    to_overlap: i64,
    /// Fail every request for this page with a non-retryable error
    fatal_page: Cell<Option<u32>>,
    /// Scrobbles that arrive right after the given page has been served
    arrivals: RefCell<Option<(u32, Vec<ScrobbleRecord>)>>,
    /// Fail this many upcoming requests with a retryable error
    transient_failures: Cell<u32>,
    recent_queries: RefCell<Vec<RecentTracksQuery>>,
    loved_requests: Cell<u32>,
}

impl FakeLastFm {
    pub fn with_scrobbles(scrobbles: Vec<ScrobbleRecord>) -> Self {
        Self {
            scrobbles: RefCell::new(scrobbles),
            loved_limit: 1000,
            ..Default::default()
        }
    }

    pub fn with_loved(mut self, loved: Vec<ApiTrack>, limit: u32) -> Self {
        self.loved = loved;
        self.loved_limit = limit;
        self
    }

    pub fn with_now_playing(mut self) -> Self {
        self.now_playing = true;
        self
    }

    pub fn with_to_overlap(mut self, seconds: i64) -> Self {
        self.to_overlap = seconds;
        self
    }

    pub fn add_raw(&self, page: u32, track: ApiTrack) {
        self.extra.borrow_mut().push((page, track));
    }

    /// Add scrobbles newer than everything served so far.
    pub fn scrobble_more(&self, newer: Vec<ScrobbleRecord>) {
        let mut scrobbles = self.scrobbles.borrow_mut();
        let mut all = newer;
        all.append(&mut scrobbles);
        *scrobbles = all;
    }

    /// Add `newer` scrobbles once `page` of the recent tracks has been served.
    pub fn scrobble_after_page(&self, page: u32, newer: Vec<ScrobbleRecord>) {
        *self.arrivals.borrow_mut() = Some((page, newer));
    }

    pub fn fail_page(&self, page: Option<u32>) {
        self.fatal_page.set(page);
    }

    pub fn fail_transiently(&self, times: u32) {
        self.transient_failures.set(times);
    }

    pub fn all_scrobbles(&self) -> Vec<ScrobbleRecord> {
        self.scrobbles.borrow().clone()
    }

    pub fn recent_queries(&self) -> Vec<RecentTracksQuery> {
        self.recent_queries.borrow().clone()
    }

    pub fn clear_queries(&self) {
        self.recent_queries.borrow_mut().clear();
    }

    pub fn loved_requests(&self) -> u32 {
        self.loved_requests.get()
    }

    fn injected_failure(&self, page: u32) -> Result<()> {
        if self.fatal_page.get() == Some(page) {
            return Err(LastFmError::Api {
                code: 6,
                message: "Invalid parameters".to_string(),
            });
        }
        let transient = self.transient_failures.get();
        if transient > 0 {
            self.transient_failures.set(transient - 1);
            return Err(LastFmError::Status { status: 503 });
        }
        Ok(())
    }
}

fn total_pages(count: usize, limit: u32) -> u32 {
    count.div_ceil(limit as usize) as u32
}

fn page_slice<T: Clone>(items: &[T], page: u32, limit: u32) -> Vec<T> {
    let start = (page.saturating_sub(1) * limit) as usize;
    items
        .iter()
        .skip(start)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait(?Send)]
impl<'a> LastFmApiClient for &'a FakeLastFm {
    async fn recent_tracks_page(&self, query: &RecentTracksQuery) -> Result<ApiPage> {
        self.recent_queries.borrow_mut().push(*query);
        self.injected_failure(query.page)?;

        let window: Vec<ScrobbleRecord> = self
            .scrobbles
            .borrow()
            .iter()
            .filter(|r| query.from.map_or(true, |from| r.timestamp >= from))
            .filter(|r| query.to.map_or(true, |to| r.timestamp <= to + self.to_overlap))
            .cloned()
            .collect();

        let mut tracks = Vec::new();
        if self.now_playing && query.page == 1 {
            tracks.push(now_playing());
        }
        tracks.extend(
            page_slice(&window, query.page, query.limit)
                .iter()
                .map(raw_scrobble),
        );
        tracks.extend(
            self.extra
                .borrow()
                .iter()
                .filter(|(page, _)| *page == query.page)
                .map(|(_, track)| track.clone()),
        );

        let arrived = {
            let mut arrivals = self.arrivals.borrow_mut();
            match arrivals.as_ref() {
                Some((page, _)) if *page == query.page => arrivals.take(),
                _ => None,
            }
        };
        if let Some((_, newer)) = arrived {
            self.scrobble_more(newer);
        }

        Ok(ApiPage {
            tracks,
            page: query.page,
            total_pages: total_pages(window.len(), query.limit),
        })
    }

    async fn loved_tracks_page(&self, page: u32) -> Result<ApiPage> {
        self.loved_requests.set(self.loved_requests.get() + 1);
        self.injected_failure(page)?;

        Ok(ApiPage {
            tracks: page_slice(&self.loved, page, self.loved_limit),
            page,
            total_pages: total_pages(self.loved.len(), self.loved_limit),
        })
    }
}
