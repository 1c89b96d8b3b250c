use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

/// Discord guild id. Every guild gets its own playback session.
pub type GroupId = u64;

/// Everything the voice driver needs to join a channel.
///
/// These values come from the gateway's voice state / voice server
/// updates, which are handled by whoever owns the bot connection.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct ChannelRef {
    /// ID of the voice channel being joined.
    pub channel_id: u64,
    /// ID of the target voice channel's parent guild.
    pub guild_id: u64,
    /// Bot user id.
    pub user_id: u64,
    /// The domain name of Discord's voice server.
    pub endpoint: String,
    /// Unique string describing this session for validation/authentication purposes.
    pub session_id: String,
    /// Discord voice token (NOT bot token)
    pub voice_token: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub style: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Completed,
    Failed,
    /// Anything we don't recognize is treated as still in progress.
    #[default]
    #[serde(other)]
    Pending,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationStatus::Pending)
    }
}

/// A generation job as reported by the provider.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,

    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub status: GenerationStatus,

    /// The prompt the track was generated from, as echoed by the provider.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Failure reason, only present when `status` is failed.
    #[serde(default)]
    pub error: Option<String>,

    /// Provider fields we pass through without looking at.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Read-only description of a queued or playing track.
///
/// The audio file itself stays owned by the session; this is only
/// for display.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    pub generation_id: String,
    pub file_path: PathBuf,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum SessionState {
    /// No voice connection yet.
    Idle,
    /// Connected, nothing playing.
    Connected,
    /// Connected, one track playing.
    Playing,
    /// Torn down. Terminal.
    Closed,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct QueueView {
    pub state: SessionState,
    pub current: Option<TrackInfo>,
    /// Up next, head first. Does not include `current`.
    pub pending: Vec<TrackInfo>,
}

impl QueueView {
    pub(crate) fn empty(state: SessionState) -> Self {
        Self {
            state,
            current: None,
            pending: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }
}
