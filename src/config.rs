use crate::backup::{BackupOptions, DEFAULT_CHECKPOINT_INTERVAL};
use crate::retry::RetryPolicy;
use crate::{LastFmError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything needed to run a backup of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub username: String,
    pub api_key: String,
    /// Directory holding `scrobbles.json`, `scrobbles_state.json` and `favourites.json`
    pub output_dir: PathBuf,
    pub checkpoint_interval: u32,
    pub scrobbles_page_limit: u32,
    pub loved_page_limit: u32,
    pub retry: RetryPolicy,
}

impl BackupConfig {
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            output_dir: PathBuf::from("."),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            scrobbles_page_limit: crate::api::RECENT_TRACKS_LIMIT,
            loved_page_limit: crate::api::LOVED_TRACKS_LIMIT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The subset of settings the backup driver uses.
    pub fn options(&self) -> BackupOptions {
        BackupOptions {
            username: self.username.clone(),
            checkpoint_interval: self.checkpoint_interval,
            page_limit: self.scrobbles_page_limit,
            retry: self.retry.clone(),
        }
    }
}

/// Credentials file, `~/.config/lastfm-backup/config.json` by default:
///
/// ```json
/// { "username": "rj", "api_key": "0123456789abcdef" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl CredentialsFile {
    /// Get the default credentials path using XDG directories.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lastfm-backup").join("config.json"))
    }

    /// Load a credentials file, returning `Ok(None)` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).map_err(|e| {
            LastFmError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let file = serde_json::from_str(&contents).map_err(|e| {
            LastFmError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        log::debug!("Credentials loaded from: {}", path.display());
        Ok(Some(file))
    }
}

/// Pick username and API key from explicit values, falling back to the credentials file.
///
/// Explicit values come from command line flags or environment variables.
pub fn resolve_credentials(
    username: Option<String>,
    api_key: Option<String>,
    file: Option<CredentialsFile>,
) -> Result<(String, String)> {
    let file = file.unwrap_or_default();
    let username = username
        .or(file.username)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| LastFmError::Config("no Last.fm username configured".to_string()))?;
    let api_key = api_key
        .or(file.api_key)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| LastFmError::Config("no Last.fm API key configured".to_string()))?;
    Ok((username, api_key))
}
