use thiserror::Error;

/// Last.fm API error codes that indicate a temporary condition on the remote side.
///
/// * 8 - Operation failed, most likely a backend error
/// * 11 - Service offline
/// * 16 - Temporarily unavailable
/// * 29 - Rate limit exceeded
const TRANSIENT_API_CODES: [u32; 4] = [8, 11, 16, 29];

/// Error types for Last.fm backup operations.
///
/// This enum covers everything that can go wrong while backing up a user's history:
/// network and API failures, records the API returned in an unexpected shape,
/// configuration problems and local storage errors.
///
/// Only some of these are worth retrying; see [`LastFmError::is_retryable`].
///
/// # Error Handling Examples
///
/// ```rust
/// use lastfm_backup::LastFmError;
///
/// fn describe(err: &LastFmError) -> String {
///     match err {
///         LastFmError::RateLimit { retry_after } => format!("slow down for {retry_after}s"),
///         LastFmError::MalformedRecord { field, .. } => format!("API shape changed: {field}"),
///         e if e.is_retryable() => format!("transient: {e}"),
///         e => format!("fatal: {e}"),
///     }
/// }
///
/// assert_eq!(
///     describe(&LastFmError::RateLimit { retry_after: 30 }),
///     "slow down for 30s"
/// );
/// ```
#[derive(Error, Debug)]
pub enum LastFmError {
    /// HTTP/network related errors.
    ///
    /// This includes connection failures, timeouts, DNS errors, and other
    /// low-level networking issues.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status and no Last.fm error body.
    #[error("Unexpected HTTP status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Rate limiting from Last.fm.
    ///
    /// The `retry_after` field indicates how many seconds to wait before
    /// the next request attempt.
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimit {
        /// Number of seconds to wait before retrying
        retry_after: u64,
    },

    /// Last.fm returned its JSON error envelope.
    #[error("Last.fm API error {code}: {message}")]
    Api {
        /// Last.fm error code
        code: u32,
        /// Human readable message from Last.fm
        message: String,
    },

    /// Failed to parse Last.fm's response.
    ///
    /// This can happen when Last.fm returns something that isn't the expected
    /// JSON envelope at all.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A track that is not "now playing" is missing a required field.
    ///
    /// This is fatal to the run: a shape change in the remote API must stop the
    /// backup rather than produce partial records.
    #[error("Malformed record (missing {field}): {record}")]
    MalformedRecord {
        /// The first required field found missing or invalid
        field: &'static str,
        /// Compact rendering of the raw record
        record: String,
    },

    /// Local state could not be written consistently.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of local files.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LastFmError {
    /// Whether the failure is transient and the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            LastFmError::Http(_) | LastFmError::RateLimit { .. } => true,
            LastFmError::Status { status } => *status == 408 || *status == 429 || *status >= 500,
            LastFmError::Api { code, .. } => TRANSIENT_API_CODES.contains(code),
            _ => false,
        }
    }
}
