use crate::{LastFmError, Result};
use async_trait::async_trait;
use http_client::{HttpClient, Request};
use http_types::{Method, Url};
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Page size for `user.getrecenttracks` (the API maximum).
pub const RECENT_TRACKS_LIMIT: u32 = 200;

/// Page size for `user.getlovedtracks` (the API maximum).
pub const LOVED_TRACKS_LIMIT: u32 = 1000;

// =============================================================================
// LastFmApiClient trait and implementation
// =============================================================================

/// Parameters of a single `user.getrecenttracks` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentTracksQuery {
    /// Page number (1 = newest)
    pub page: u32,
    /// Tracks per page
    pub limit: u32,
    /// Only return scrobbles at or after this unix timestamp
    pub from: Option<i64>,
    /// Only return scrobbles at or before this unix timestamp
    pub to: Option<i64>,
}

impl RecentTracksQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page,
            limit: RECENT_TRACKS_LIMIT,
            from: None,
            to: None,
        }
    }
}

/// A page of raw track entries, as decoded from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPage {
    pub tracks: Vec<ApiTrack>,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Total pages for the query; 0 when the query matches nothing
    pub total_pages: u32,
}

/// Read-only access to the two Last.fm endpoints a backup needs.
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's concern.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait(?Send)]
pub trait LastFmApiClient {
    /// Fetch one page of the user's scrobbles, newest first.
    async fn recent_tracks_page(&self, query: &RecentTracksQuery) -> Result<ApiPage>;

    /// Fetch one page of the user's loved tracks.
    async fn loved_tracks_page(&self, page: u32) -> Result<ApiPage>;
}

#[derive(Clone)]
pub struct LastFmApiClientImpl {
    client: Arc<dyn HttpClient + Send + Sync>,
    base_url: String,
    username: String,
    api_key: String,
    loved_limit: u32,
}

impl LastFmApiClientImpl {
    pub fn new(
        client: Box<dyn HttpClient + Send + Sync>,
        username: String,
        api_key: String,
    ) -> Self {
        Self {
            client: Arc::from(client),
            base_url: DEFAULT_BASE_URL.to_string(),
            username,
            api_key,
            loved_limit: LOVED_TRACKS_LIMIT,
        }
    }

    /// Point the client at a different API root (a mirror or a local test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_loved_limit(mut self, limit: u32) -> Self {
        self.loved_limit = limit;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn method_url(&self, method: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}?method={}&user={}&api_key={}&format=json",
            self.base_url,
            method,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.api_key),
        );
        for (name, value) in params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_json(&self, url: &str, root: &str) -> Result<ApiPage> {
        let parsed = url
            .parse::<Url>()
            .map_err(|e| LastFmError::Http(format!("Invalid URL {url}: {e}")))?;
        let request = Request::new(Method::Get, parsed);

        let request_start = std::time::Instant::now();
        let mut response = self
            .client
            .send(request)
            .await
            .map_err(|e| LastFmError::Http(e.to_string()))?;
        let status: u16 = response.status().into();

        log::debug!(
            "{root} response: {status} status in {}ms",
            request_start.elapsed().as_millis()
        );

        let retry_after = response
            .header("retry-after")
            .and_then(|h| h.get(0))
            .and_then(|v| v.as_str().parse::<u64>().ok());

        let body = response
            .body_string()
            .await
            .map_err(|e| LastFmError::Http(e.to_string()))?;

        check_status(status, retry_after, &body)?;
        parse_page_response(&body, root)
    }
}

#[async_trait(?Send)]
impl LastFmApiClient for LastFmApiClientImpl {
    async fn recent_tracks_page(&self, query: &RecentTracksQuery) -> Result<ApiPage> {
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("page", query.page.to_string()),
        ];
        if let Some(from) = query.from {
            params.push(("from", from.to_string()));
        }
        if let Some(to) = query.to {
            params.push(("to", to.to_string()));
        }

        let url = self.method_url("user.getrecenttracks", &params);
        self.get_json(&url, "recenttracks").await
    }

    async fn loved_tracks_page(&self, page: u32) -> Result<ApiPage> {
        let params = [
            ("limit", self.loved_limit.to_string()),
            ("page", page.to_string()),
        ];
        let url = self.method_url("user.getlovedtracks", &params);
        self.get_json(&url, "lovedtracks").await
    }
}

// =============================================================================
// Response decoding
// =============================================================================

/// A raw track entry shared by both endpoints.
///
/// Everything is optional here; deciding what is required is the normalizer's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiTrack {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artist: Option<ApiArtist>,
    #[serde(default)]
    pub album: Option<ApiTextField>,
    #[serde(default)]
    pub date: Option<ApiDate>,
    #[serde(default)]
    pub mbid: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "@attr", default)]
    pub attr: Option<ApiTrackAttr>,
}

impl ApiTrack {
    /// Whether Last.fm flagged this entry as currently playing.
    pub fn is_now_playing(&self) -> bool {
        self.attr
            .as_ref()
            .and_then(|a| a.nowplaying.as_deref())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Artist object: `{"#text": ...}` on recent tracks, `{"name": ...}` on loved
/// tracks and extended responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiArtist {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "#text", default)]
    pub text: Option<String>,
}

impl ApiArtist {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiTextField {
    #[serde(rename = "#text", default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiDate {
    #[serde(default)]
    pub uts: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiTrackAttr {
    #[serde(default)]
    pub nowplaying: Option<String>,
}

#[derive(Deserialize)]
struct ApiTrackList {
    #[serde(default)]
    track: OneOrMany<ApiTrack>,
    #[serde(rename = "@attr")]
    attr: ApiPaginationAttr,
}

/// Last.fm collapses single-item lists into a bare object.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(Box<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![*item],
        }
    }
}

#[derive(Deserialize)]
struct ApiPaginationAttr {
    page: String,
    #[serde(rename = "totalPages")]
    total_pages: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: u32,
    #[serde(default)]
    message: String,
}

/// Map a response status and body to an error, if the request failed.
///
/// A Last.fm error envelope wins over the bare status, since its code says
/// more about whether retrying can help.
pub fn check_status(status: u16, retry_after: Option<u64>, body: &str) -> Result<()> {
    if let Ok(err) = serde_json::from_str::<ApiErrorResponse>(body) {
        return Err(LastFmError::Api {
            code: err.error,
            message: err.message,
        });
    }

    if status == 429 {
        return Err(LastFmError::RateLimit {
            retry_after: retry_after.unwrap_or(60),
        });
    }

    if !(200..300).contains(&status) {
        return Err(LastFmError::Status { status });
    }

    Ok(())
}

/// Decode a `recenttracks`/`lovedtracks` JSON document into an [`ApiPage`].
pub fn parse_page_response(json: &str, root: &str) -> Result<ApiPage> {
    let mut document: serde_json::Value =
        serde_json::from_str(json).map_err(|e| LastFmError::Parse(e.to_string()))?;

    let list = document
        .get_mut(root)
        .map(serde_json::Value::take)
        .ok_or_else(|| LastFmError::Parse(format!("missing '{root}' object")))?;
    let list: ApiTrackList =
        serde_json::from_value(list).map_err(|e| LastFmError::Parse(e.to_string()))?;

    let page = list
        .attr
        .page
        .parse()
        .map_err(|_| LastFmError::Parse(format!("invalid page '{}'", list.attr.page)))?;
    let total_pages = list.attr.total_pages.parse().map_err(|_| {
        LastFmError::Parse(format!("invalid totalPages '{}'", list.attr.total_pages))
    })?;

    Ok(ApiPage {
        tracks: list.track.into_vec(),
        page,
        total_pages,
    })
}
