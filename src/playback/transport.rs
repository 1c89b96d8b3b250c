use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::api::api_types::ChannelRef;
use crate::events::session::SessionCommand;
use crate::Result;

/// Identifies one live voice connection held by a transport.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ConnectionHandle(pub u64);

/// Handed to the transport with every track it starts. The transport
/// must call [`PlaybackFinished::notify`] once the track stops, whether
/// it ran out, was stopped, or failed.
///
/// Notifying posts a message to the owning session rather than touching
/// its state directly.
#[derive(Debug)]
pub struct PlaybackFinished {
    playback_id: u64,
    tx: UnboundedSender<SessionCommand>,
}

impl PlaybackFinished {
    pub(crate) fn new(playback_id: u64, tx: UnboundedSender<SessionCommand>) -> Self {
        Self { playback_id, tx }
    }

    pub fn notify(self, error: Option<String>) {
        // the session may already be gone, in which case there's
        // nobody left to care
        self.tx
            .send(SessionCommand::Finished {
                playback_id: self.playback_id,
                error,
            })
            .ok();
    }
}

/// The voice side of the bot: joining channels and playing files into them.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, channel: &ChannelRef) -> Result<ConnectionHandle>;

    /// Leaves the channel. Unknown handles are ignored.
    async fn disconnect(&self, handle: ConnectionHandle);

    /// Starts playing `path`, replacing anything already playing.
    async fn start_playback(
        &self,
        handle: ConnectionHandle,
        path: &Path,
        on_finished: PlaybackFinished,
    ) -> Result<()>;

    /// Stops the current track. Its `on_finished` still fires.
    async fn stop_playback(&self, handle: ConnectionHandle);

    async fn is_playing(&self, handle: ConnectionHandle) -> bool;
}
