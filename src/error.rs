//! Error types for discjockey.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// `RemoteError` is an HTTP failure; `RemoteGenerationFailed` is the
/// provider reporting that the job itself went wrong.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider refused to accept a generation job.
    #[error("generation request rejected ({status}): {body}")]
    RemoteRejected { status: u16, body: String },

    /// A response was missing a field we depend on.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Non-2xx status on an otherwise well-formed call.
    #[error("remote error ({status}): {body}")]
    RemoteError { status: u16, body: String },

    /// The provider reports that the generation itself failed.
    #[error("generation failed: {reason}")]
    RemoteGenerationFailed { reason: String },

    /// Polling gave up before the generation reached a terminal status.
    #[error("generation timed out after {attempts} polls")]
    GenerationTimeout { attempts: u32 },

    /// Connection-level failure, no HTTP status was received.
    #[error("network: {0}")]
    NetworkFailure(String),

    /// Temp file creation, write or removal failed.
    #[error("filesystem: {0}")]
    FileSystemFailure(#[from] std::io::Error),

    /// The voice transport could not connect or start playback.
    #[error("transport: {0}")]
    Transport(String),

    /// The session has no voice connection to play into.
    #[error("not connected to a voice channel")]
    NotConnected,

    /// The session was torn down before the command reached it.
    #[error("session closed")]
    SessionClosed,

    /// The caller cancelled the request.
    #[error("cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::MalformedResponse(error.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::SessionClosed
    }
}
