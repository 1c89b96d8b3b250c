use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use songbird::{
    id::{ChannelId, GuildId, UserId},
    tracks::{PlayMode, TrackHandle},
    ConnectionInfo, Event, EventContext, TrackEvent,
};

use crate::{
    api::api_types::ChannelRef,
    playback::transport::{ConnectionHandle, PlaybackFinished, VoiceTransport},
    Error, Result,
};

struct Connection {
    driver: songbird::Driver,
    track: Option<TrackHandle>,
}

/// Voice transport built on songbird, with one driver per connection.
///
/// Audio files are decoded by songbird's ffmpeg input, so ffmpeg must be
/// installed.
pub struct SongbirdTransport {
    config: songbird::Config,
    connections: Mutex<HashMap<ConnectionHandle, Arc<tokio::sync::Mutex<Connection>>>>,
    next_handle: AtomicU64,
}

impl Default for SongbirdTransport {
    fn default() -> Self {
        Self::new(songbird::Config::default())
    }
}

impl SongbirdTransport {
    pub fn new(config: songbird::Config) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn connection(&self, handle: ConnectionHandle) -> Option<Arc<tokio::sync::Mutex<Connection>>> {
        self.connections
            .lock()
            .ok()
            .and_then(|connections| connections.get(&handle).cloned())
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, channel: &ChannelRef) -> Result<ConnectionHandle> {
        let connection_info = ConnectionInfo {
            channel_id: Some(ChannelId::from(channel.channel_id)),
            endpoint: channel.endpoint.clone(),
            guild_id: GuildId::from(channel.guild_id),
            session_id: channel.session_id.clone(),
            token: channel.voice_token.clone(),
            user_id: UserId::from(channel.user_id),
        };

        let mut driver = songbird::Driver::new(self.config.clone());
        driver
            .connect(connection_info)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let handle = ConnectionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.connections
            .lock()
            .map_err(|_| Error::Transport("connection table poisoned".into()))?
            .insert(
                handle,
                Arc::new(tokio::sync::Mutex::new(Connection {
                    driver,
                    track: None,
                })),
            );
        Ok(handle)
    }

    async fn disconnect(&self, handle: ConnectionHandle) {
        let connection = match self.connections.lock() {
            Ok(mut connections) => connections.remove(&handle),
            Err(_) => None,
        };
        if let Some(connection) = connection {
            let mut connection = connection.lock().await;
            if let Some(track) = connection.track.take() {
                track.stop().ok();
            }
            connection.driver.leave();
        }
    }

    async fn start_playback(
        &self,
        handle: ConnectionHandle,
        path: &Path,
        on_finished: PlaybackFinished,
    ) -> Result<()> {
        let connection = self
            .connection(handle)
            .ok_or_else(|| Error::Transport("not connected".into()))?;

        let source = songbird::input::ffmpeg(path)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let (track, track_handle) = songbird::tracks::create_player(source);

        // register before the track is handed to the mixer, so even a
        // very short track can't end unnoticed
        track_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    on_finished: Mutex::new(Some(on_finished)),
                },
            )
            .map_err(|e| Error::Transport(e.to_string()))?;

        let mut connection = connection.lock().await;
        if let Some(previous) = connection.track.replace(track_handle) {
            previous.stop().ok();
        }
        connection.driver.play(track);
        Ok(())
    }

    async fn stop_playback(&self, handle: ConnectionHandle) {
        if let Some(connection) = self.connection(handle) {
            if let Some(track) = connection.lock().await.track.take() {
                if let Err(error) = track.stop() {
                    tracing::warn!(%error, "error stopping track");
                }
            }
        }
    }

    async fn is_playing(&self, handle: ConnectionHandle) -> bool {
        let Some(connection) = self.connection(handle) else {
            return false;
        };
        let track = connection.lock().await.track.clone();
        match track {
            Some(track) => track
                .get_info()
                .await
                .map(|state| matches!(state.playing, PlayMode::Play))
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Fires the session's finish notifier the first time the track ends.
/// Songbird reports a stopped track as ended too.
struct TrackEndHandler {
    on_finished: Mutex<Option<PlaybackFinished>>,
}

#[async_trait]
impl songbird::EventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(_) = ctx {
            let on_finished = self
                .on_finished
                .lock()
                .ok()
                .and_then(|mut on_finished| on_finished.take());
            if let Some(on_finished) = on_finished {
                on_finished.notify(None);
            }
        }
        Some(Event::Cancel)
    }
}
