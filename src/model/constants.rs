// the provider takes somewhere between a few seconds and a few minutes
// to render a track, so we poll every 5 seconds for up to 5 minutes.

use std::time::Duration;

pub(crate) const DEFAULT_API_URL: &str = "https://api.suno.ai/v1";

pub(crate) const POLL_INTERVAL_SECONDS: u64 = 5;
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(POLL_INTERVAL_SECONDS);

pub(crate) const MAX_POLL_ATTEMPTS: u32 = 60;

/// Downloads are copied to disk this many bytes at a time.
pub(crate) const DOWNLOAD_CHUNK_SIZE: usize = 1024;

pub(crate) const AUDIO_FILE_PREFIX: &str = "discjockey-";
pub(crate) const AUDIO_FILE_SUFFIX: &str = ".mp3";

pub(crate) const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Title used when the provider doesn't echo back a prompt.
pub(crate) const UNKNOWN_TRACK_TITLE: &str = "Unknown track";

/// The provider answers a freshly submitted job with 202 Accepted.
pub(crate) const STATUS_ACCEPTED: u16 = 202;

pub(crate) const API_KEY_ENV: &str = "SUNO_API_KEY";
pub(crate) const API_URL_ENV: &str = "SUNO_API_URL";
pub(crate) const TEMP_DIR_ENV: &str = "DISCJOCKEY_TEMP_DIR";
