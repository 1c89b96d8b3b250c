use tokio::sync::oneshot;

use crate::api::api_types::{ChannelRef, QueueView, TrackInfo};
use crate::model::track::Track;
use crate::Result;

/// Why a session stopped.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub(crate) enum CloseReason {
    /// It played everything it had and left on its own.
    QueueFinished,
    /// Somebody asked it to leave, or nothing could reach it any more.
    Left,
}

/// What became of a track offered to a session.
#[derive(Debug)]
pub(crate) enum Offer {
    /// The session took the track, or refused it and deleted its file.
    Taken(Result<TrackInfo>),
    /// The session had already closed. The track is handed back untouched.
    Returned(Track, CloseReason),
}

/// Everything a playback session can be asked to do. Commands are
/// applied one at a time, in the order they arrive.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Connect {
        channel: ChannelRef,
        reply: oneshot::Sender<Result<()>>,
    },
    Enqueue {
        track: Track,
        reply: oneshot::Sender<Offer>,
    },
    /// Posted by the voice transport when a track stops, for whatever reason.
    Finished {
        playback_id: u64,
        error: Option<String>,
    },
    Skip {
        reply: oneshot::Sender<bool>,
    },
    Leave {
        reply: Option<oneshot::Sender<()>>,
    },
    View {
        reply: oneshot::Sender<QueueView>,
    },
}

impl SessionCommand {
    /// Called for commands which arrive after the session has closed.
    /// A track is handed back to whoever offered it; everything else just
    /// drops its reply channel.
    pub(crate) fn reject(self, reason: CloseReason) {
        if let SessionCommand::Enqueue { track, reply } = self {
            if let Err(Offer::Returned(track, _)) = reply.send(Offer::Returned(track, reason)) {
                // nobody is waiting for it
                track.discard();
            }
        }
    }

    /// The track carried by an `Enqueue`, if this is one.
    pub(crate) fn into_track(self) -> Option<Track> {
        match self {
            SessionCommand::Enqueue { track, .. } => Some(track),
            _ => None,
        }
    }
}
