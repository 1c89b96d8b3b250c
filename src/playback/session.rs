use std::sync::{Arc, OnceLock, Weak};

use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
        oneshot,
    },
    task,
};

use crate::{
    api::api_types::{ChannelRef, GroupId, QueueView, SessionState, TrackInfo},
    events::session::{CloseReason, Offer, SessionCommand},
    model::{track::Track, track_queue::TrackQueue},
    playback::{
        registry::RegistryInner,
        transport::{ConnectionHandle, PlaybackFinished, VoiceTransport},
    },
    Error, Result,
};

/// Cheap, cloneable address of one group's playback session.
///
/// Every call is a message to the session's task, so calls from any number
/// of places are applied strictly one after another.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    closed: Arc<OnceLock<CloseReason>>,
    group_id: GroupId,
    session_id: u64,
    tx: UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub(crate) fn session_id(&self) -> u64 {
        self.session_id
    }

    /// True once the session has torn down and stopped taking commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Joins `channel`. Does nothing if the session is already connected.
    pub async fn connect(&self, channel: ChannelRef) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Connect { channel, reply })?;
        rx.await?
    }

    /// Appends `track` to the queue, starting playback if nothing is playing.
    ///
    /// If the session can't take the track, its file is deleted.
    pub async fn enqueue(&self, track: Track) -> Result<TrackInfo> {
        match self.offer(track).await {
            Offer::Taken(result) => result,
            Offer::Returned(track, _) => {
                track.discard();
                Err(Error::SessionClosed)
            }
        }
    }

    /// Like [`SessionHandle::enqueue`], but a closed session hands the
    /// track back along with the reason it closed.
    pub(crate) async fn offer(&self, track: Track) -> Offer {
        let (reply, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(command)) =
            self.tx.send(SessionCommand::Enqueue { track, reply })
        {
            return match command.into_track() {
                Some(track) => Offer::Returned(track, self.close_reason()),
                None => Offer::Taken(Err(Error::SessionClosed)),
            };
        }
        rx.await
            .unwrap_or_else(|_| Offer::Taken(Err(Error::SessionClosed)))
    }

    /// Stops the current track, which moves the queue along. Returns false
    /// if nothing was playing.
    pub async fn skip(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(SessionCommand::Skip { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Tears the session down. Safe to call on a session that is
    /// already closed.
    pub async fn leave(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(SessionCommand::Leave { reply: Some(reply) }).is_ok() {
            rx.await.ok();
        }
    }

    /// Asks the session to tear down without waiting for it.
    pub(crate) fn close(&self) {
        self.send(SessionCommand::Leave { reply: None }).ok();
    }

    pub async fn view(&self) -> QueueView {
        let (reply, rx) = oneshot::channel();
        if self.send(SessionCommand::View { reply }).is_err() {
            return QueueView::empty(SessionState::Closed);
        }
        rx.await
            .unwrap_or_else(|_| QueueView::empty(SessionState::Closed))
    }

    /// Why the session closed. Only meaningful once it has.
    fn close_reason(&self) -> CloseReason {
        self.closed.get().copied().unwrap_or(CloseReason::Left)
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx.send(command).map_err(|mpsc::error::SendError(command)| {
            command.reject(self.close_reason());
            Error::SessionClosed
        })
    }
}

struct NowPlaying {
    playback_id: u64,
    track: Track,
}

/// The state machine for one group.
///
/// Owns the queue, the playing track and the voice connection. Lives in
/// its own task and is only ever touched from there.
pub(crate) struct PlaybackSession {
    channel: Option<ChannelRef>,
    closed: Arc<OnceLock<CloseReason>>,
    connection: Option<ConnectionHandle>,
    current: Option<NowPlaying>,
    group_id: GroupId,
    next_playback_id: u64,
    queue: TrackQueue,
    registry: Weak<RegistryInner>,
    session_id: u64,
    state: SessionState,
    transport: Arc<dyn VoiceTransport>,
    tx_self: WeakUnboundedSender<SessionCommand>,
}

impl PlaybackSession {
    pub(crate) fn spawn(
        group_id: GroupId,
        session_id: u64,
        transport: Arc<dyn VoiceTransport>,
        registry: Weak<RegistryInner>,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel::<SessionCommand>();
        let closed = Arc::new(OnceLock::new());
        let session = Self {
            channel: None,
            closed: closed.clone(),
            connection: None,
            current: None,
            group_id,
            next_playback_id: 0,
            queue: TrackQueue::new(),
            registry,
            session_id,
            state: SessionState::Idle,
            transport,
            tx_self: tx.downgrade(),
        };
        task::spawn(session.loop_forever(rx));
        SessionHandle {
            closed,
            group_id,
            session_id,
            tx,
        }
    }

    async fn loop_forever(mut self, mut rx: UnboundedReceiver<SessionCommand>) {
        tracing::debug!(group_id = self.group_id, "session started");
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
            if self.state == SessionState::Closed {
                break;
            }
        }

        // every handle was dropped without anyone asking us to leave
        self.teardown(CloseReason::Left).await;

        let reason = self.closed.get().copied().unwrap_or(CloseReason::Left);
        rx.close();
        while let Some(command) = rx.recv().await {
            command.reject(reason);
        }
        tracing::debug!(group_id = self.group_id, "session finished");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { channel, reply } => {
                reply.send(self.on_connect(channel).await).ok();
            }
            SessionCommand::Enqueue { track, reply } => {
                reply.send(Offer::Taken(self.on_enqueue(track).await)).ok();
            }
            SessionCommand::Finished { playback_id, error } => {
                self.on_finished(playback_id, error).await;
            }
            SessionCommand::Skip { reply } => {
                reply.send(self.on_skip().await).ok();
            }
            SessionCommand::Leave { reply } => {
                self.teardown(CloseReason::Left).await;
                if let Some(reply) = reply {
                    reply.send(()).ok();
                }
            }
            SessionCommand::View { reply } => {
                reply.send(self.view()).ok();
            }
        }
    }

    async fn on_connect(&mut self, channel: ChannelRef) -> Result<()> {
        if self.connection.is_some() {
            if self.channel.as_ref() != Some(&channel) {
                tracing::debug!(
                    group_id = self.group_id,
                    channel_id = channel.channel_id,
                    "already connected, keeping the current channel"
                );
            }
            return Ok(());
        }

        let connection = self.transport.connect(&channel).await?;
        tracing::info!(
            group_id = self.group_id,
            channel_id = channel.channel_id,
            "joined voice channel"
        );
        self.connection = Some(connection);
        self.channel = Some(channel);
        self.set_state(SessionState::Connected);
        Ok(())
    }

    async fn on_enqueue(&mut self, track: Track) -> Result<TrackInfo> {
        if self.connection.is_none() {
            track.discard();
            return Err(Error::NotConnected);
        }

        let info = track.info();
        tracing::info!(
            group_id = self.group_id,
            title = %info.title,
            generation_id = %info.generation_id,
            "added to queue"
        );
        self.queue.enqueue(track);
        if self.current.is_none() {
            self.play_next().await;
        }
        Ok(info)
    }

    async fn on_finished(&mut self, playback_id: u64, error: Option<String>) {
        let is_current = matches!(&self.current, Some(now) if now.playback_id == playback_id);
        if !is_current {
            tracing::debug!(group_id = self.group_id, playback_id, "ignoring stale finish");
            return;
        }

        if let Some(error) = error {
            tracing::error!(group_id = self.group_id, %error, "error playing track");
        }
        if let Some(NowPlaying { track, .. }) = self.current.take() {
            track.discard();
        }
        self.set_state(SessionState::Connected);
        self.play_next().await;
    }

    async fn on_skip(&mut self) -> bool {
        let Some(connection) = self.connection else {
            return false;
        };
        if self.state != SessionState::Playing || !self.transport.is_playing(connection).await {
            return false;
        }
        // the transport's finish notification does the rest
        self.transport.stop_playback(connection).await;
        true
    }

    /// Starts the head of the queue. Tracks which fail to start are thrown
    /// away. Once the queue runs dry the session leaves.
    async fn play_next(&mut self) {
        let Some(connection) = self.connection else {
            return;
        };

        while let Some(track) = self.queue.dequeue_next() {
            let Some(tx) = self.tx_self.upgrade() else {
                // nobody can reach us any more
                track.discard();
                break;
            };
            self.next_playback_id += 1;
            let playback_id = self.next_playback_id;

            match self
                .transport
                .start_playback(
                    connection,
                    track.file_path(),
                    PlaybackFinished::new(playback_id, tx),
                )
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        group_id = self.group_id,
                        title = track.title(),
                        generation_id = track.generation_id(),
                        remaining = self.queue.len(),
                        "now playing"
                    );
                    self.current = Some(NowPlaying { playback_id, track });
                    self.set_state(SessionState::Playing);
                    return;
                }
                Err(error) => {
                    tracing::error!(
                        group_id = self.group_id,
                        title = track.title(),
                        %error,
                        "could not start track"
                    );
                    track.discard();
                }
            }
        }

        tracing::info!(group_id = self.group_id, "queue finished, leaving");
        self.teardown(CloseReason::QueueFinished).await;
    }

    /// Drops the queue, stops and deletes the current track, leaves the
    /// channel and takes us out of the registry. Only the first call does
    /// anything, and its `reason` is the one recorded.
    async fn teardown(&mut self, reason: CloseReason) {
        if self.state == SessionState::Closed {
            return;
        }
        self.closed.set(reason).ok();

        if !self.queue.is_empty() {
            tracing::debug!(
                group_id = self.group_id,
                pending = self.queue.len(),
                "dropping queued tracks"
            );
        }
        self.queue.clear();
        if let Some(NowPlaying { track, .. }) = self.current.take() {
            if let Some(connection) = self.connection {
                self.transport.stop_playback(connection).await;
            }
            track.discard();
        }
        if let Some(connection) = self.connection.take() {
            self.transport.disconnect(connection).await;
            tracing::info!(group_id = self.group_id, "left voice channel");
        }
        self.channel = None;
        self.set_state(SessionState::Closed);

        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.group_id, self.session_id);
        }
    }

    fn view(&self) -> QueueView {
        QueueView {
            state: self.state,
            current: self.current.as_ref().map(|now| now.track.info()),
            pending: self.queue.snapshot(),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(
                group_id = self.group_id,
                from = ?self.state,
                to = ?state,
                "session state"
            );
            self.state = state;
        }
    }
}
