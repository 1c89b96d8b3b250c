use std::{path::PathBuf, time::Duration};

use crate::model::constants::{
    API_KEY_ENV, API_URL_ENV, AUDIO_FILE_SUFFIX, DEFAULT_API_URL, DOWNLOAD_CHUNK_SIZE,
    MAX_POLL_ATTEMPTS, POLL_INTERVAL, TEMP_DIR_ENV,
};
use crate::{Error, Result};

/// Settings for talking to the generation provider and storing its audio.
#[derive(Debug, Clone)]
pub struct JukeboxConfig {
    /// Base URL of the provider API, without a trailing slash.
    pub api_url: String,

    /// Bearer token sent with every API call.
    pub api_key: String,

    /// How long to wait between status polls.
    pub poll_interval: Duration,

    /// How many status polls to make before giving up.
    pub max_poll_attempts: u32,

    /// Size of each read while copying a download to disk.
    pub download_chunk_size: usize,

    /// Where downloaded tracks are written. Defaults to the system temp dir.
    pub temp_dir: PathBuf,

    /// Extension given to downloaded tracks.
    pub audio_suffix: String,
}

impl Default for JukeboxConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            poll_interval: POLL_INTERVAL,
            max_poll_attempts: MAX_POLL_ATTEMPTS,
            download_chunk_size: DOWNLOAD_CHUNK_SIZE,
            temp_dir: std::env::temp_dir(),
            audio_suffix: AUDIO_FILE_SUFFIX.to_string(),
        }
    }
}

impl JukeboxConfig {
    /// Builds a config from the process environment.
    ///
    /// `SUNO_API_KEY` is required. `SUNO_API_URL` and `DISCJOCKEY_TEMP_DIR`
    /// override the defaults when set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{API_KEY_ENV} is not set")))?;

        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Some(api_url) = lookup(API_URL_ENV) {
            config.api_url = api_url.trim_end_matches('/').to_string();
        }
        if let Some(temp_dir) = lookup(TEMP_DIR_ENV) {
            config.temp_dir = PathBuf::from(temp_dir);
        }
        Ok(config)
    }
}
