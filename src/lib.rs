pub mod api {
    pub mod api_types;
}
pub mod config;
mod error;
mod events {
    pub(crate) mod session;
}
pub mod generation {
    pub mod client;
    pub mod http;
}
pub mod model {
    pub(crate) mod constants;
    pub mod track;
    pub(crate) mod track_queue;
}
pub mod playback {
    pub mod registry;
    pub mod session;
    pub mod transport;
}
pub mod songbird_client {
    pub mod transport;
}
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use crate::error::{Error, Result};

use crate::api::api_types::{
    ChannelRef, GenerationRecord, GenerationRequest, GenerationStatus, GroupId, QueueView,
    SessionState, TrackInfo,
};
use crate::config::JukeboxConfig;
use crate::events::session::{CloseReason, Offer};
use crate::generation::client::{cancellable, GenerationClient};
use crate::generation::http::{HttpClient, ReqwestHttpClient};
use crate::model::constants::{DEFAULT_SEARCH_LIMIT, UNKNOWN_TRACK_TITLE};
use crate::model::track::Track;
use crate::playback::registry::SessionRegistry;
use crate::playback::session::SessionHandle;
use crate::playback::transport::VoiceTransport;
use crate::songbird_client::transport::SongbirdTransport;

/// Generates music on request and plays it into voice channels, one
/// queue per guild.
pub struct Jukebox {
    client: GenerationClient,
    registry: SessionRegistry,
}

impl Jukebox {
    /// A jukebox which talks to the provider over reqwest and plays
    /// through songbird.
    pub fn new(config: JukeboxConfig) -> Self {
        Self::with_capabilities(
            config,
            Arc::new(ReqwestHttpClient::new()),
            Arc::new(SongbirdTransport::default()),
        )
    }

    pub fn with_capabilities(
        config: JukeboxConfig,
        http: Arc<dyn HttpClient>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        Self {
            client: GenerationClient::with_http_client(config, http),
            registry: SessionRegistry::new(transport),
        }
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Joins `channel` for the guild, if not already connected.
    pub async fn join(&self, group_id: GroupId, channel: &ChannelRef) -> Result<SessionHandle> {
        let session = self.registry.get_or_create(group_id);
        session.connect(channel.clone()).await?;
        Ok(session)
    }

    /// Generates a new track from `request` and queues it for the guild.
    ///
    /// A request cancelled through `cancel` never reaches the queue.
    pub async fn submit_and_enqueue(
        &self,
        group_id: GroupId,
        channel: &ChannelRef,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<TrackInfo> {
        let session = self.join(group_id, channel).await?;

        let generation_id = cancellable(cancel, self.client.submit(request)).await?;
        self.client.await_completion(&generation_id, cancel).await?;

        let track = self
            .fetch_track(request.prompt.clone(), generation_id, cancel)
            .await?;
        self.enqueue(group_id, channel, session, track, cancel).await
    }

    /// Queues an already generated track by its id, waiting for it to
    /// finish first if it is still being generated.
    pub async fn enqueue_by_id(
        &self,
        group_id: GroupId,
        channel: &ChannelRef,
        generation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TrackInfo> {
        let session = self.join(group_id, channel).await?;

        let record = cancellable(cancel, self.client.lookup(generation_id)).await?;
        let record = match record.status {
            GenerationStatus::Completed => record,
            GenerationStatus::Failed => {
                return Err(Error::RemoteGenerationFailed {
                    reason: record.error.unwrap_or_else(|| "unknown error".to_string()),
                })
            }
            GenerationStatus::Pending => {
                self.client.await_completion(generation_id, cancel).await?
            }
        };

        let title = record
            .prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TRACK_TITLE.to_string());
        let track = self
            .fetch_track(title, generation_id.to_string(), cancel)
            .await?;
        self.enqueue(group_id, channel, session, track, cancel).await
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<GenerationRecord>> {
        self.client
            .search(query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .await
    }

    /// What's playing and what's next. A guild with no session reports
    /// an empty, idle queue.
    pub async fn current_queue_view(&self, group_id: GroupId) -> QueueView {
        match self.registry.get(group_id) {
            Some(session) => session.view().await,
            None => QueueView::empty(SessionState::Idle),
        }
    }

    pub async fn skip(&self, group_id: GroupId) -> bool {
        match self.registry.get(group_id) {
            Some(session) => session.skip().await,
            None => false,
        }
    }

    /// Leaves the guild's voice channel and drops its queue. Does nothing
    /// if there is no session.
    pub async fn leave(&self, group_id: GroupId) {
        if let Some(session) = self.registry.get(group_id) {
            session.leave().await;
        }
    }

    /// Leaves every guild.
    pub async fn shutdown(&self) {
        for group_id in self.registry.groups() {
            self.leave(group_id).await;
        }
    }

    async fn fetch_track(
        &self,
        title: String,
        generation_id: String,
        cancel: &CancellationToken,
    ) -> Result<Track> {
        let url = cancellable(cancel, self.client.resolve_playable_url(&generation_id)).await?;
        let file = self.client.materialize(&url, cancel).await?;
        Ok(Track::new(title, generation_id, file))
    }

    /// Hands `track` to the session joined for this request.
    ///
    /// Generating takes minutes, and the session may have run out of music
    /// and left in the meantime. In that case the channel is joined again
    /// and the track played there. A session somebody told to leave keeps
    /// the track from being played.
    async fn enqueue(
        &self,
        group_id: GroupId,
        channel: &ChannelRef,
        mut session: SessionHandle,
        mut track: Track,
        cancel: &CancellationToken,
    ) -> Result<TrackInfo> {
        loop {
            if cancel.is_cancelled() {
                track.discard();
                return Err(Error::Cancelled);
            }
            match session.offer(track).await {
                Offer::Taken(result) => return result,
                Offer::Returned(returned, CloseReason::QueueFinished) => {
                    tracing::info!(group_id, "queue finished while generating, rejoining");
                    track = returned;
                    session = match self.join(group_id, channel).await {
                        Ok(session) => session,
                        Err(error) => {
                            track.discard();
                            return Err(error);
                        }
                    };
                }
                Offer::Returned(returned, CloseReason::Left) => {
                    tracing::debug!(group_id, "session was left, dropping track");
                    returned.discard();
                    return Err(Error::SessionClosed);
                }
            }
        }
    }
}
